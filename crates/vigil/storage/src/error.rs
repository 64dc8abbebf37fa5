//! Storage error types.

use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record with the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-set transition lost its race or the record was not
    /// in the expected state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection establishment failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A query failed.
    #[error("query error: {0}")]
    Query(String),

    /// Stored data could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
