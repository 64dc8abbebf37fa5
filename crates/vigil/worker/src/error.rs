//! Worker error types.

use thiserror::Error;
use vigil_queue::QueueError;
use vigil_storage::StorageError;

/// Errors raised while submitting an intent.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Errors raised by the worker pool lifecycle.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool already running")]
    AlreadyRunning,

    #[error("worker pool is not running")]
    NotRunning,
}
