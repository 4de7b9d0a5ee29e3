//! Cross-algorithm checks over larger generated graphs.

use taskmesh_graph::algorithms::{
    critical_path, detect_cycles, is_dag, sample_cycles, shortest_path,
    strongly_connected_components, topological_sort, DEFAULT_CYCLE_COUNT_CAP,
};
use taskmesh_graph::{Dtype, EdgeSchema, EdgeStore, Field};

fn layered_schema() -> EdgeSchema {
    EdgeSchema::new(vec![
        Field::new("source", Dtype::U16),
        Field::new("target", Dtype::U16),
        Field::new("kind", Dtype::U8),
        Field::new("priority", Dtype::U8),
        Field::new("duration", Dtype::U16),
    ])
    .unwrap()
}

/// Build a layered DAG: `layers` layers of `width` vertices, every vertex
/// wired to each vertex of the next layer. Edge weight grows with the layer
/// so the critical path is forced through the last rows.
fn layered_dag(layers: i128, width: i128) -> EdgeStore {
    let mut store = EdgeStore::new(layered_schema(), "source", "target").unwrap();
    for layer in 0..layers - 1 {
        for a in 0..width {
            for b in 0..width {
                let source = layer * width + a;
                let target = (layer + 1) * width + b;
                store
                    .add_edge(&[
                        ("source", source),
                        ("target", target),
                        ("kind", 1),
                        ("priority", (a % 3) as i128),
                        ("duration", layer + 1),
                    ])
                    .unwrap();
            }
        }
    }
    store
}

#[test]
fn layered_dag_orders_by_layer() {
    let store = layered_dag(10, 8);
    let adj = store.adjacency();
    assert_eq!(adj.vertex_count(), 80);
    assert!(is_dag(&adj));

    let order = topological_sort(&adj).unwrap();
    assert_eq!(order.len(), 80);

    let position: std::collections::HashMap<i128, usize> =
        order.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    for v in adj.vertices() {
        for e in adj.outgoing(*v) {
            assert!(position[v] < position[&e.vertex]);
        }
    }
}

#[test]
fn layered_dag_critical_path_spans_all_layers() {
    let store = layered_dag(10, 4);
    let adj = store.adjacency();
    let (weight, path) = critical_path(&adj).unwrap();
    // 9 hops with weights 1..=9
    assert_eq!(weight, (1..=9).sum::<i128>());
    assert_eq!(path.len(), 10);
}

#[test]
fn layered_dag_shortest_path_is_one_hop_per_layer() {
    let store = layered_dag(6, 4);
    let adj = store.adjacency();
    let (hops, path) = shortest_path(&adj, 0, 5 * 4, false);
    assert_eq!(hops, Some(5));
    assert_eq!(path.len(), 6);
}

#[test]
fn deep_chain_does_not_overflow_stack() {
    // long enough that recursive traversal would blow the native stack
    let mut store = EdgeStore::new(
        EdgeSchema::new(vec![
            Field::new("source", Dtype::U32),
            Field::new("target", Dtype::U32),
        ])
        .unwrap(),
        "source",
        "target",
    )
    .unwrap();
    let n = 200_000i128;
    for v in 0..n {
        store.add_edge(&[("source", v), ("target", v + 1)]).unwrap();
    }
    let adj = store.adjacency();

    let (has_cycle, count) = detect_cycles(&adj, DEFAULT_CYCLE_COUNT_CAP);
    assert!(!has_cycle);
    assert_eq!(count, 0);

    let components = strongly_connected_components(&adj);
    assert_eq!(components.len(), (n + 1) as usize);

    let order = topological_sort(&adj).unwrap();
    assert_eq!(order.first(), Some(&0));
    assert_eq!(order.last(), Some(&n));
}

#[test]
fn injected_cycle_is_detected_and_sampled() {
    let mut store = layered_dag(5, 4);
    // close a loop from the last layer back to the first
    store
        .add_edge(&[
            ("source", 4 * 4),
            ("target", 0),
            ("kind", 1),
            ("priority", 0),
            ("duration", 1),
        ])
        .unwrap();
    let adj = store.adjacency();

    assert!(!is_dag(&adj));
    let (has_cycle, count) = detect_cycles(&adj, DEFAULT_CYCLE_COUNT_CAP);
    assert!(has_cycle);
    assert!(count >= 1);

    let cycles = sample_cycles(&adj, 3, Some(&[0]));
    assert!(!cycles.is_empty());
    for cycle in &cycles {
        assert!(cycle.contains(&0));
    }

    let sccs = strongly_connected_components(&adj);
    let largest = sccs.iter().map(Vec::len).max().unwrap();
    assert!(largest > 1);
}
