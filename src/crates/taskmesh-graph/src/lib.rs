//! Graph kernel for the taskmesh dependency engine.
//!
//! This crate provides the low-level building blocks the engine runs its
//! dependency analysis on:
//!
//! - [`EdgeSchema`] / [`EdgeStore`] - a compact binary container that stores
//!   directed edges as fixed-length little-endian records with a
//!   caller-defined field layout. Designed for large edge sets: scans are
//!   O(E) with no per-edge allocation.
//! - [`Adjacency`] - a materialized adjacency view (out- and in-lists) that
//!   both the binary store and the engine's typed task graph can produce.
//! - [`algorithms`] - topological sort, strongly connected components, cycle
//!   detection and sampling, critical path, and shortest path. All traversals
//!   run on an explicit stack so deep graphs cannot overflow the native
//!   stack.
//!
//! Nothing in this crate performs I/O or suspends; it is safe to call from
//! any context.

pub mod adjacency;
pub mod algorithms;
pub mod error;
pub mod schema;
pub mod store;

pub use adjacency::{AdjEdge, Adjacency};
pub use error::GraphError;
pub use schema::{Dtype, EdgeSchema, Field};
pub use store::EdgeStore;

/// Result type for graph kernel operations
pub type Result<T> = std::result::Result<T, GraphError>;
