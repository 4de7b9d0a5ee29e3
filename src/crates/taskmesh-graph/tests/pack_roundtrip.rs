//! Property test: packing an in-range record and unpacking it yields the
//! original values, for every dtype across its full domain (including
//! `u64` values above `i64::MAX`).

use proptest::prelude::*;
use taskmesh_graph::{Dtype, EdgeSchema, EdgeStore, Field};

fn all_dtypes_schema() -> EdgeSchema {
    EdgeSchema::new(vec![
        Field::new("source", Dtype::U32),
        Field::new("target", Dtype::U32),
        Field::new("a_u8", Dtype::U8),
        Field::new("a_i8", Dtype::I8),
        Field::new("a_u16", Dtype::U16),
        Field::new("a_i16", Dtype::I16),
        Field::new("a_i32", Dtype::I32),
        Field::new("a_u64", Dtype::U64),
        Field::new("a_i64", Dtype::I64),
    ])
    .unwrap()
}

proptest! {
    #[test]
    fn pack_unpack_roundtrip(
        source in any::<u32>(),
        target in any::<u32>(),
        a_u8 in any::<u8>(),
        a_i8 in any::<i8>(),
        a_u16 in any::<u16>(),
        a_i16 in any::<i16>(),
        a_i32 in any::<i32>(),
        a_u64 in any::<u64>(),
        a_i64 in any::<i64>(),
    ) {
        let mut store = EdgeStore::new(all_dtypes_schema(), "source", "target").unwrap();
        let idx = store.add_edge(&[
            ("source", source as i128),
            ("target", target as i128),
            ("a_u8", a_u8 as i128),
            ("a_i8", a_i8 as i128),
            ("a_u16", a_u16 as i128),
            ("a_i16", a_i16 as i128),
            ("a_i32", a_i32 as i128),
            ("a_u64", a_u64 as i128),
            ("a_i64", a_i64 as i128),
        ]).unwrap();

        let edge = store.get_edge(idx).unwrap();
        prop_assert_eq!(edge["source"], source as i128);
        prop_assert_eq!(edge["target"], target as i128);
        prop_assert_eq!(edge["a_u8"], a_u8 as i128);
        prop_assert_eq!(edge["a_i8"], a_i8 as i128);
        prop_assert_eq!(edge["a_u16"], a_u16 as i128);
        prop_assert_eq!(edge["a_i16"], a_i16 as i128);
        prop_assert_eq!(edge["a_i32"], a_i32 as i128);
        prop_assert_eq!(edge["a_u64"], a_u64 as i128);
        prop_assert_eq!(edge["a_i64"], a_i64 as i128);

        // the dump reloads to the same record
        let reloaded = EdgeStore::from_bytes(
            all_dtypes_schema(),
            "source",
            "target",
            store.as_bytes().to_vec(),
        ).unwrap();
        prop_assert_eq!(reloaded.get_edge(idx).unwrap(), edge);
    }
}

#[test]
fn u64_top_half_is_accepted() {
    let mut store = EdgeStore::new(all_dtypes_schema(), "source", "target").unwrap();
    let big = u64::MAX as i128;
    let idx = store
        .add_edge(&[
            ("source", 1),
            ("target", 2),
            ("a_u8", 0),
            ("a_i8", 0),
            ("a_u16", 0),
            ("a_i16", 0),
            ("a_i32", 0),
            ("a_u64", big),
            ("a_i64", 0),
        ])
        .unwrap();
    assert_eq!(store.get_edge(idx).unwrap()["a_u64"], big);

    // one past the dtype's domain is rejected
    let err = store
        .add_edge(&[
            ("source", 1),
            ("target", 2),
            ("a_u8", 0),
            ("a_i8", 0),
            ("a_u16", 0),
            ("a_i16", 0),
            ("a_i32", 0),
            ("a_u64", big + 1),
            ("a_i64", 0),
        ])
        .unwrap_err();
    assert!(matches!(err, taskmesh_graph::GraphError::OutOfRange { .. }));
}
