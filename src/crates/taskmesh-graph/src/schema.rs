//! Binary edge record layout
//!
//! An [`EdgeSchema`] describes the fixed-length binary layout of one edge
//! record: an ordered list of named integer fields packed little-endian at
//! fixed offsets with no padding. The schema is defined by the caller and
//! travels out-of-band; a dump of an edge store is just `num_edges *
//! record_size` bytes.

use crate::error::GraphError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Integer field width and signedness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
}

impl Dtype {
    /// Size of the field in bytes
    pub fn size(&self) -> usize {
        match self {
            Dtype::U8 | Dtype::I8 => 1,
            Dtype::U16 | Dtype::I16 => 2,
            Dtype::U32 | Dtype::I32 => 4,
            Dtype::U64 | Dtype::I64 => 8,
        }
    }

    /// Inclusive value bounds for the dtype.
    ///
    /// Values travel as `i128`, which is wide enough for every dtype's full
    /// domain, `U64`'s `0..=u64::MAX` included.
    pub fn bounds(&self) -> (i128, i128) {
        match self {
            Dtype::U8 => (0, u8::MAX as i128),
            Dtype::I8 => (i8::MIN as i128, i8::MAX as i128),
            Dtype::U16 => (0, u16::MAX as i128),
            Dtype::I16 => (i16::MIN as i128, i16::MAX as i128),
            Dtype::U32 => (0, u32::MAX as i128),
            Dtype::I32 => (i32::MIN as i128, i32::MAX as i128),
            Dtype::U64 => (0, u64::MAX as i128),
            Dtype::I64 => (i64::MIN as i128, i64::MAX as i128),
        }
    }

    /// True if `value` fits the dtype
    pub fn contains(&self, value: i128) -> bool {
        let (lo, hi) = self.bounds();
        value >= lo && value <= hi
    }

    fn write_le(&self, value: i128, out: &mut [u8]) {
        match self {
            Dtype::U8 => out[..1].copy_from_slice(&(value as u8).to_le_bytes()),
            Dtype::I8 => out[..1].copy_from_slice(&(value as i8).to_le_bytes()),
            Dtype::U16 => out[..2].copy_from_slice(&(value as u16).to_le_bytes()),
            Dtype::I16 => out[..2].copy_from_slice(&(value as i16).to_le_bytes()),
            Dtype::U32 => out[..4].copy_from_slice(&(value as u32).to_le_bytes()),
            Dtype::I32 => out[..4].copy_from_slice(&(value as i32).to_le_bytes()),
            Dtype::U64 => out[..8].copy_from_slice(&(value as u64).to_le_bytes()),
            Dtype::I64 => out[..8].copy_from_slice(&(value as i64).to_le_bytes()),
        }
    }

    fn read_le(&self, bytes: &[u8]) -> i128 {
        match self {
            Dtype::U8 => u8::from_le_bytes([bytes[0]]) as i128,
            Dtype::I8 => i8::from_le_bytes([bytes[0]]) as i128,
            Dtype::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as i128,
            Dtype::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i128,
            Dtype::U32 => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i128
            }
            Dtype::I32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i128
            }
            Dtype::U64 => u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                bytes[7],
            ]) as i128,
            Dtype::I64 => i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                bytes[7],
            ]) as i128,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::U8 => "u8",
            Dtype::I8 => "i8",
            Dtype::U16 => "u16",
            Dtype::I16 => "i16",
            Dtype::U32 => "u32",
            Dtype::I32 => "i32",
            Dtype::U64 => "u64",
            Dtype::I64 => "i64",
        };
        write!(f, "{}", name)
    }
}

/// A single named field within an edge record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: Dtype,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Fixed binary layout of an edge record.
///
/// Fields sit at fixed offsets in declaration order; the record size is the
/// sum of the field sizes. Layout is little-endian regardless of host.
#[derive(Debug, Clone)]
pub struct EdgeSchema {
    fields: Vec<Field>,
    offsets: HashMap<String, usize>,
    record_size: usize,
}

impl EdgeSchema {
    /// Build a schema from an ordered field list.
    ///
    /// Field names must be unique.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut offsets = HashMap::with_capacity(fields.len());
        let mut record_size = 0;
        for field in &fields {
            if offsets.insert(field.name.clone(), record_size).is_some() {
                return Err(GraphError::DuplicateField(field.name.clone()));
            }
            record_size += field.dtype.size();
        }
        Ok(Self {
            fields,
            offsets,
            record_size,
        })
    }

    /// Total bytes per record
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte offset of a field within the record
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.offsets.get(name).copied()
    }

    /// True if the schema declares a field with this name
    pub fn has_field(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }

    /// Pack named values into `buf` at `offset`.
    ///
    /// Every schema field must be present in `values`; each value is
    /// range-checked against its dtype. `buf` must hold at least
    /// `offset + record_size` bytes.
    pub fn pack_into(&self, buf: &mut [u8], offset: usize, values: &[(&str, i128)]) -> Result<()> {
        for (name, _) in values {
            if !self.has_field(name) {
                return Err(GraphError::UnknownField((*name).to_string()));
            }
        }
        for field in &self.fields {
            let value = values
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, v)| *v)
                .ok_or_else(|| GraphError::MissingField(field.name.clone()))?;
            if !field.dtype.contains(value) {
                return Err(GraphError::OutOfRange {
                    field: field.name.clone(),
                    dtype: field.dtype,
                    value,
                });
            }
            let at = offset + self.offsets[&field.name];
            field.dtype.write_le(value, &mut buf[at..at + field.dtype.size()]);
        }
        Ok(())
    }

    /// Unpack one record from `buf` at `offset` into a name -> value map
    pub fn unpack_from(&self, buf: &[u8], offset: usize) -> HashMap<String, i128> {
        let mut out = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            let at = offset + self.offsets[&field.name];
            out.insert(
                field.name.clone(),
                field.dtype.read_le(&buf[at..at + field.dtype.size()]),
            );
        }
        out
    }

    /// Read a single field from a record without unpacking the rest
    pub fn read_field(&self, buf: &[u8], record_offset: usize, name: &str) -> Option<i128> {
        let field = self.field(name)?;
        let at = record_offset + self.offsets[name];
        Some(field.dtype.read_le(&buf[at..at + field.dtype.size()]))
    }
}
