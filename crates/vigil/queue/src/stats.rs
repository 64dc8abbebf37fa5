//! Queue counter snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_types::TaskEnvelope;

/// Identity of the most recent task to complete successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastProcessedTask {
    pub task_id: String,
    pub action_id: i64,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

impl LastProcessedTask {
    pub fn from_envelope(envelope: &TaskEnvelope) -> Self {
        Self {
            task_id: envelope.task_id.clone(),
            action_id: envelope.action_id,
            target: envelope.target.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Point-in-time counter snapshot for the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub queue_length: u64,
    pub tasks_enqueued: u64,
    pub tasks_dequeued: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub last_processed_task: Option<LastProcessedTask>,
}
