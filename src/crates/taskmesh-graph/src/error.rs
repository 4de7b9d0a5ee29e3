//! Error types for the graph kernel

use crate::schema::Dtype;
use thiserror::Error;

/// Errors raised by schema construction, edge storage, and graph algorithms
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A field name referenced by the caller is not part of the schema
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Two schema fields share the same name
    #[error("duplicate field in schema: {0}")]
    DuplicateField(String),

    /// A schema field was not supplied when packing an edge
    #[error("missing field in edge data: {0}")]
    MissingField(String),

    /// A value does not fit the declared dtype
    #[error("value {value} out of range for {dtype} field {field:?}")]
    OutOfRange {
        field: String,
        dtype: Dtype,
        value: i128,
    },

    /// Edge index past the end of the store
    #[error("edge index {0} out of range")]
    IndexOutOfRange(usize),

    /// A raw buffer does not divide evenly into records
    #[error("buffer length {len} is not a multiple of record size {record_size}")]
    TruncatedBuffer { len: usize, record_size: usize },

    /// Topological sort could not order every vertex
    #[error("graph contains a cycle")]
    Cycle,

    /// An algorithm that requires a DAG was given a cyclic graph
    #[error("graph is not a DAG")]
    NotADag,
}

impl GraphError {
    /// True if the error indicates the graph is cyclic
    pub fn is_cyclic(&self) -> bool {
        matches!(self, GraphError::Cycle | GraphError::NotADag)
    }
}
