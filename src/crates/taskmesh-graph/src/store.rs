//! Compact binary edge container
//!
//! [`EdgeStore`] keeps a large directed edge set as one contiguous buffer of
//! fixed-length records described by an [`EdgeSchema`]. Two schema fields are
//! nominated as the source and target endpoints; an optional `duration`
//! field, when present, supplies edge weights to the adjacency view.
//!
//! A dump of the store is headerless: exactly `num_edges * record_size`
//! bytes, the schema traveling out-of-band.

use crate::adjacency::Adjacency;
use crate::error::GraphError;
use crate::schema::EdgeSchema;
use crate::Result;
use std::collections::{BTreeSet, HashMap};

/// Well-known field name used as the edge weight when materializing
/// adjacency.
pub const WEIGHT_FIELD: &str = "duration";

/// Fixed-record binary edge container.
#[derive(Debug, Clone)]
pub struct EdgeStore {
    schema: EdgeSchema,
    source_field: String,
    target_field: String,
    buffer: Vec<u8>,
    num_edges: usize,
}

impl EdgeStore {
    /// Create an empty store.
    ///
    /// Both `source_field` and `target_field` must exist in the schema.
    pub fn new(
        schema: EdgeSchema,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Result<Self> {
        let source_field = source_field.into();
        let target_field = target_field.into();
        if !schema.has_field(&source_field) {
            return Err(GraphError::UnknownField(source_field));
        }
        if !schema.has_field(&target_field) {
            return Err(GraphError::UnknownField(target_field));
        }
        Ok(Self {
            schema,
            source_field,
            target_field,
            buffer: Vec::new(),
            num_edges: 0,
        })
    }

    /// Rebuild a store from a raw dump produced by [`EdgeStore::as_bytes`].
    ///
    /// The buffer must divide evenly into records of the schema's size.
    pub fn from_bytes(
        schema: EdgeSchema,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let record_size = schema.record_size();
        if record_size == 0 || bytes.len() % record_size != 0 {
            return Err(GraphError::TruncatedBuffer {
                len: bytes.len(),
                record_size,
            });
        }
        let num_edges = bytes.len() / record_size;
        let mut store = Self::new(schema, source_field, target_field)?;
        store.buffer = bytes;
        store.num_edges = num_edges;
        Ok(store)
    }

    /// Number of stored edges
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Current buffer size in bytes; always `num_edges * record_size`
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// The schema this store packs records with
    pub fn schema(&self) -> &EdgeSchema {
        &self.schema
    }

    /// Raw record bytes (the headerless dump format)
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Append an edge and return its 0-based index.
    ///
    /// Every schema field must be present in `fields`; each value is
    /// range-checked against its dtype's bounds.
    pub fn add_edge(&mut self, fields: &[(&str, i128)]) -> Result<usize> {
        let record_size = self.schema.record_size();
        let start = self.buffer.len();
        self.buffer.resize(start + record_size, 0);
        if let Err(err) = self.schema.pack_into(&mut self.buffer, start, fields) {
            self.buffer.truncate(start);
            return Err(err);
        }
        self.num_edges += 1;
        Ok(self.num_edges - 1)
    }

    /// Unpack the edge at `idx` into a field -> value map.
    pub fn get_edge(&self, idx: usize) -> Result<HashMap<String, i128>> {
        if idx >= self.num_edges {
            return Err(GraphError::IndexOutOfRange(idx));
        }
        Ok(self
            .schema
            .unpack_from(&self.buffer, idx * self.schema.record_size()))
    }

    /// Distinct source and target values across all edges.
    ///
    /// Single pass over the buffer reading only the endpoint fields.
    pub fn vertices(&self) -> BTreeSet<i128> {
        let mut vertices = BTreeSet::new();
        let record_size = self.schema.record_size();
        for i in 0..self.num_edges {
            let offset = i * record_size;
            // endpoint fields were validated at construction
            let src = self
                .schema
                .read_field(&self.buffer, offset, &self.source_field)
                .unwrap_or(0);
            let tgt = self
                .schema
                .read_field(&self.buffer, offset, &self.target_field)
                .unwrap_or(0);
            vertices.insert(src);
            vertices.insert(tgt);
        }
        vertices
    }

    /// Materialize paired out/in adjacency lists.
    ///
    /// The weight of each entry comes from the `duration` field when the
    /// schema declares one, otherwise 0. Insertion order of edges is
    /// preserved within each list.
    pub fn adjacency(&self) -> Adjacency {
        let mut adj = Adjacency::new();
        let record_size = self.schema.record_size();
        let has_weight = self.schema.has_field(WEIGHT_FIELD);
        for i in 0..self.num_edges {
            let offset = i * record_size;
            let src = self
                .schema
                .read_field(&self.buffer, offset, &self.source_field)
                .unwrap_or(0);
            let tgt = self
                .schema
                .read_field(&self.buffer, offset, &self.target_field)
                .unwrap_or(0);
            let weight = if has_weight {
                self.schema
                    .read_field(&self.buffer, offset, WEIGHT_FIELD)
                    .unwrap_or(0)
            } else {
                0
            };
            adj.add_edge(src, tgt, i, weight);
        }
        adj
    }
}
