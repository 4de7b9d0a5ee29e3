//! Engine error taxonomy
//!
//! Errors are grouped into six categories a boundary layer can map onto any
//! transport: validation, not-found, forbidden, conflict, transient, and
//! internal. Graph invariant violations (`WouldCreateCycle`, duplicate edge)
//! are conflicts; store contention is transient and retried at the engine
//! boundary.

use crate::store::StoreError;
use thiserror::Error;

/// Coarse error category for boundary mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Transient,
    Internal,
}

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input; no state change
    #[error("invalid input: {0}")]
    Validation(String),

    /// Entity missing by id
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// AuthZ predicate returned false
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Inserting the edge would close a cycle
    #[error("dependency would create a cycle")]
    WouldCreateCycle,

    /// The (source, target) pair already exists
    #[error("dependency {from_id} -> {target} already exists")]
    DuplicateDependency { from_id: i64, target: i64 },

    /// Other uniqueness or invariant violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store contention or notifier trouble; retryable
    #[error("transient failure: {0}")]
    Transient(String),

    /// Invariant broken at runtime; never swallowed
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Category for boundary mapping
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::NotFound { .. } => ErrorCategory::NotFound,
            EngineError::Forbidden(_) => ErrorCategory::Forbidden,
            EngineError::WouldCreateCycle
            | EngineError::DuplicateDependency { .. }
            | EngineError::Conflict(_) => ErrorCategory::Conflict,
            EngineError::Transient(_) => ErrorCategory::Transient,
            EngineError::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.category() == ErrorCategory::Conflict
    }

    pub fn is_forbidden(&self) -> bool {
        self.category() == ErrorCategory::Forbidden
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => EngineError::Internal(format!(
                "store row vanished mid-operation: {}",
                msg
            )),
            StoreError::Constraint(msg) => EngineError::Conflict(msg),
            StoreError::Busy(msg) => EngineError::Transient(msg),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            EngineError::validation("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            EngineError::not_found("task", 3).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            EngineError::WouldCreateCycle.category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            EngineError::DuplicateDependency { from_id: 1, target: 2 }.category(),
            ErrorCategory::Conflict
        );
        assert!(EngineError::WouldCreateCycle.is_conflict());
        assert!(EngineError::forbidden("no").is_forbidden());
    }

    #[test]
    fn store_errors_map_to_categories() {
        let busy: EngineError = StoreError::Busy("locked".into()).into();
        assert_eq!(busy.category(), ErrorCategory::Transient);

        let constraint: EngineError = StoreError::Constraint("unique".into()).into();
        assert_eq!(constraint.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn display_includes_ids() {
        let err = EngineError::not_found("task", 42);
        assert_eq!(err.to_string(), "task 42 not found");
    }
}
