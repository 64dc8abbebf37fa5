//! Worker pool and remediator dispatch.
//!
//! The producer turns engine intents into persisted action records plus
//! queued envelopes. The pool consumes envelopes, honors the circuit
//! breaker, drives the external remediator over HTTP and walks each
//! action record through its lifecycle, retrying transient failures with
//! exponential backoff.

mod error;
mod pool;
mod producer;
mod remediator;
mod retry;

pub use error::{ProducerError, WorkerError};
pub use pool::{PoolStatus, WorkerConfig, WorkerPool};
pub use producer::RemediationProducer;
pub use remediator::{DispatchOutcome, RemediatorClient};
pub use retry::RetryPolicy;
