//! Store error types
//!
//! Custom error type for persistence operations with conversion from sqlx
//! errors. Uniqueness violations and contention get their own variants so the
//! engine can classify them (conflict vs. transient) without string matching.

use thiserror::Error;

/// Errors surfaced by [`crate::store::Store`] implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection-level failure
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Row expected but missing
    #[error("record not found: {0}")]
    NotFound(String),

    /// Unique-index or foreign-key violation
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Contention (locked database, pool exhausted); retryable
    #[error("store busy: {0}")]
    Busy(String),

    /// Stored value could not be decoded into the domain model
    #[error("row decoding failed: {0}")]
    Decode(String),

    /// Query execution error
    #[error("query failed: {0}")]
    Query(String),

    /// Anything else
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn not_found(context: impl Into<String>) -> Self {
        StoreError::NotFound(context.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        StoreError::Constraint(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        StoreError::Decode(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                StoreError::NotFound("no matching row".to_string())
            }
            sqlx::Error::Database(db) => {
                let msg = db.message().to_string();
                if msg.contains("UNIQUE constraint failed")
                    || msg.contains("FOREIGN KEY constraint failed")
                {
                    StoreError::Constraint(msg)
                } else if msg.contains("database is locked")
                    || msg.contains("database table is locked")
                {
                    StoreError::Busy(msg)
                } else {
                    StoreError::Query(msg)
                }
            }
            sqlx::Error::PoolTimedOut => {
                StoreError::Busy("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                StoreError::Connection("connection pool is closed".to_string())
            }
            sqlx::Error::ColumnNotFound(col) => {
                StoreError::Decode(format!("column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Decode(format!("error decoding column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                StoreError::Decode(format!("decode error: {}", source))
            }
            sqlx::Error::Io(err) => StoreError::Connection(format!("io error: {}", err)),
            sqlx::Error::Configuration(msg) => {
                StoreError::Connection(format!("configuration error: {}", msg))
            }
            err => StoreError::Other(err.to_string()),
        }
    }
}
