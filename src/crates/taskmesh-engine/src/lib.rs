//! Task dependency engine for collaborative projects.
//!
//! The engine maintains a directed, acyclic dependency graph over tasks
//! scoped to projects, computes task readiness from upstream completion, and
//! reactively fires configurable actions (notifications, status mutations,
//! deferred work) when a task reaches a final status.
//!
//! # Architecture
//!
//! ```text
//!   command ──▶ TaskEngine ──▶ AuthZ (pure predicates)
//!                  │
//!                  ├──▶ TaskGraph (invariants, cycle prevention, readiness)
//!                  │
//!                  ├──▶ Store (transactional persistence capability)
//!                  │
//!                  └──▶ action cascade ──▶ Notifier (out-of-band delivery)
//!                                     └──▶ Scheduler queue (delayed work)
//!
//!   Scheduler worker ── tick ──▶ claim due rows ──▶ re-enter the evaluator
//! ```
//!
//! External collaborators are capabilities injected at construction:
//! [`store::Store`], [`notifier::Notifier`], and [`clock::Clock`]. The crate
//! ships in-memory reference implementations for all three plus a
//! SQLite-backed store.

pub mod actions;
pub mod authz;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod store;

pub use actions::{ActionDispatch, ActionOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, SchedulerConfig};
pub use engine::{
    CreateDependency, CreateTask, GraphSnapshot, StatusChange, TaskEngine, TaskStats,
    TaskUpdate,
};
pub use error::{EngineError, ErrorCategory};
pub use graph::TaskGraph;
pub use notifier::{MemoryNotifier, NotificationKind, Notifier, NotifyError, NullNotifier};
pub use scheduler::{Scheduler, TickOutcome};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
