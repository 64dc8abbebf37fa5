//! Queue error types.

use thiserror::Error;

/// Errors surfaced by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Connection establishment failed.
    #[error("queue connection error: {0}")]
    Connection(String),

    /// A backend operation failed.
    #[error("queue operation failed: {0}")]
    Backend(String),

    /// A stored envelope could not be decoded.
    #[error("envelope decode error: {0}")]
    Decode(String),
}

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
