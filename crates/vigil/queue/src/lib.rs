//! The remediation queue.
//!
//! One global FIFO named `remediation_queue` connects intent producers to
//! the worker pool. Consumers block on [`RemediationQueue::dequeue`] with
//! a timeout; producers append to the tail. Every operation maintains the
//! observable counters operators read through the stats API.

mod error;
mod memory;
mod postgres;
mod stats;

use std::time::Duration;

use async_trait::async_trait;
use vigil_types::TaskEnvelope;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use postgres::PostgresQueue;
pub use stats::{LastProcessedTask, QueueStats};

/// Name of the single remediation FIFO.
pub const QUEUE_NAME: &str = "remediation_queue";

/// Multi-producer multi-consumer FIFO of task envelopes.
///
/// Ordering: envelopes are observed by consumers in enqueue order. A
/// dequeue is destructive; once claimed an envelope is gone from the
/// queue regardless of what the worker does with it.
#[async_trait]
pub trait RemediationQueue: Send + Sync {
    /// Append an envelope to the tail.
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()>;

    /// Pop the head, blocking up to `timeout`. `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<TaskEnvelope>>;

    /// Current queue depth. Advisory; may be momentarily stale.
    async fn len(&self) -> QueueResult<u64>;

    /// Counter snapshot.
    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Count one task that reached `completed` and record it as the
    /// last processed task. Only successful outcomes update
    /// `last_processed_task`; a dequeue alone does not.
    async fn record_completed(&self, envelope: &TaskEnvelope) -> QueueResult<()>;

    /// Count one task that reached `failed`.
    async fn record_failed(&self) -> QueueResult<()>;
}
