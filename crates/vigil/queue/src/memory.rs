//! In-memory queue for development and testing.
//!
//! FIFO semantics match the durable backend; durability obviously does
//! not. Blocking dequeue is implemented with a notify handle so waiting
//! consumers wake as soon as a producer appends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use vigil_types::TaskEnvelope;

use crate::error::QueueResult;
use crate::stats::{LastProcessedTask, QueueStats};
use crate::{RemediationQueue, QUEUE_NAME};

/// In-memory FIFO backend.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<TaskEnvelope>>,
    notify: Notify,
    tasks_enqueued: AtomicU64,
    tasks_dequeued: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    last_processed: Mutex<Option<LastProcessedTask>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self) -> Option<TaskEnvelope> {
        self.items.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl RemediationQueue for MemoryQueue {
    async fn enqueue(&self, envelope: TaskEnvelope) -> QueueResult<()> {
        debug!(
            task_id = %envelope.task_id,
            action_id = envelope.action_id,
            target = %envelope.target,
            attempt = envelope.attempt,
            "Task enqueued"
        );
        self.items.lock().unwrap().push_back(envelope);
        self.tasks_enqueued.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<TaskEnvelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(envelope) = self.try_pop() {
                self.tasks_dequeued.fetch_add(1, Ordering::SeqCst);
                debug!(
                    task_id = %envelope.task_id,
                    action_id = envelope.action_id,
                    "Task dequeued"
                );
                return Ok(Some(envelope));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Woken by the next enqueue or the remaining timeout budget,
            // whichever comes first.
            let _ = tokio::time::timeout_at(deadline, self.notify.notified()).await;
        }
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.items.lock().unwrap().len() as u64)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            queue_name: QUEUE_NAME.to_string(),
            queue_length: self.items.lock().unwrap().len() as u64,
            tasks_enqueued: self.tasks_enqueued.load(Ordering::SeqCst),
            tasks_dequeued: self.tasks_dequeued.load(Ordering::SeqCst),
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
            last_processed_task: self.last_processed.lock().unwrap().clone(),
        })
    }

    async fn record_completed(&self, envelope: &TaskEnvelope) -> QueueResult<()> {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
        *self.last_processed.lock().unwrap() =
            Some(LastProcessedTask::from_envelope(envelope));
        Ok(())
    }

    async fn record_failed(&self) -> QueueResult<()> {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{ActionIntent, Params, RemediationAction, Severity};

    fn envelope(task_id: &str, action_id: i64) -> TaskEnvelope {
        let intent = ActionIntent {
            policy_name: "p".to_string(),
            action: RemediationAction::Restart,
            target: "web-1".to_string(),
            severity: Severity::Warning,
            params: Params::new(),
        };
        TaskEnvelope::first_attempt(task_id, action_id, &intent)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::new();
        for (task_id, action_id) in [("A", 1), ("B", 2), ("C", 3)] {
            queue.enqueue(envelope(task_id, action_id)).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let env = queue
                .dequeue(Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            seen.push(env.task_id);
        }
        assert_eq!(seen, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = MemoryQueue::new();
        let start = std::time::Instant::now();
        let result = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(MemoryQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(envelope("late", 9)).await.unwrap();

        let env = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(env.task_id, "late");
    }

    #[tokio::test]
    async fn test_stats_track_operations() {
        let queue = MemoryQueue::new();
        queue.enqueue(envelope("A", 1)).await.unwrap();
        queue.enqueue(envelope("B", 2)).await.unwrap();
        let dequeued = queue
            .dequeue(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();

        // Dequeue alone does not touch last_processed_task.
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queue_name, QUEUE_NAME);
        assert_eq!(stats.queue_length, 1);
        assert_eq!(stats.tasks_enqueued, 2);
        assert_eq!(stats.tasks_dequeued, 1);
        assert_eq!(stats.tasks_completed, 0);
        assert!(stats.last_processed_task.is_none());

        queue.record_completed(&dequeued).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.tasks_failed, 0);
        let last = stats.last_processed_task.unwrap();
        assert_eq!(last.task_id, "A");
        assert_eq!(last.action_id, 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_last_processed_unset() {
        let queue = MemoryQueue::new();
        queue.enqueue(envelope("A", 1)).await.unwrap();
        queue.dequeue(Duration::from_millis(50)).await.unwrap();
        queue.record_failed().await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.tasks_failed, 1);
        assert!(stats.last_processed_task.is_none());
    }
}
