//! Remediation producer.
//!
//! The bridge between the policy engine and the queue: every intent
//! becomes one pending action record and one queued envelope. The
//! remediator is never called on this path.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;
use vigil_queue::RemediationQueue;
use vigil_storage::ActionStorage;
use vigil_types::{ActionIntent, ActionRecord, TaskEnvelope};

use crate::error::ProducerError;

/// Turns intents into persisted actions plus queued envelopes.
pub struct RemediationProducer {
    storage: Arc<dyn ActionStorage>,
    queue: Arc<dyn RemediationQueue>,
}

impl RemediationProducer {
    pub fn new(storage: Arc<dyn ActionStorage>, queue: Arc<dyn RemediationQueue>) -> Self {
        Self { storage, queue }
    }

    /// Persist and enqueue one intent. Returns the action id.
    ///
    /// If the enqueue fails after the record was created, the action is
    /// walked to `failed` so it never lingers as a pending ghost.
    pub async fn submit(&self, intent: &ActionIntent) -> Result<i64, ProducerError> {
        let details = serde_json::json!({
            "policy_name": intent.policy_name,
            "params": intent.params,
            "triggered_at": chrono::Utc::now(),
        });
        let record = ActionRecord::pending(&intent.target, intent.action.as_str())
            .with_details(details.to_string());
        let action_id = self.storage.create_action(record).await?;

        let task_id = format!("task_{}", Uuid::new_v4());
        let envelope = TaskEnvelope::first_attempt(task_id, action_id, intent);

        if let Err(err) = self.queue.enqueue(envelope.clone()).await {
            error!(
                action_id,
                policy = %intent.policy_name,
                target = %intent.target,
                %err,
                "Failed to enqueue remediation task"
            );
            // Best effort: the record exists but will never be delivered.
            if self.storage.claim_action(action_id).await.is_ok() {
                let _ = self
                    .storage
                    .mark_failed(action_id, &format!("enqueue_failed: {err}"))
                    .await;
            }
            return Err(err.into());
        }

        info!(
            action_id,
            task_id = %envelope.task_id,
            policy = %intent.policy_name,
            action = %intent.action,
            target = %intent.target,
            "Remediation action recorded and enqueued"
        );
        Ok(action_id)
    }
}
