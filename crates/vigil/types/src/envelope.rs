//! Task envelopes carried by the remediation queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActionIntent, Params, Severity};

/// Serialized payload placed on the queue, one per enqueue.
///
/// Each envelope references exactly one action record; `attempt` is
/// 1-based and increases across retries of the same action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Unique task identifier, also used as the idempotency key.
    pub task_id: String,

    /// The action record this envelope executes.
    pub action_id: i64,

    pub target: String,
    pub action: String,
    pub severity: Severity,

    #[serde(default)]
    pub params: Params,

    pub enqueued_at: DateTime<Utc>,

    /// 1-based delivery attempt.
    pub attempt: u32,
}

impl TaskEnvelope {
    /// First-attempt envelope for a freshly created action record.
    pub fn first_attempt(task_id: impl Into<String>, action_id: i64, intent: &ActionIntent) -> Self {
        Self {
            task_id: task_id.into(),
            action_id,
            target: intent.target.clone(),
            action: intent.action.as_str().to_string(),
            severity: intent.severity,
            params: intent.params.clone(),
            enqueued_at: Utc::now(),
            attempt: 1,
        }
    }

    /// Copy of this envelope for the next delivery attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemediationAction;

    #[test]
    fn test_first_attempt_envelope() {
        let intent = ActionIntent {
            policy_name: "high-cpu".to_string(),
            action: RemediationAction::Restart,
            target: "web-1".to_string(),
            severity: Severity::Critical,
            params: Params::new(),
        };
        let env = TaskEnvelope::first_attempt("task-1", 7, &intent);
        assert_eq!(env.attempt, 1);
        assert_eq!(env.action_id, 7);
        assert_eq!(env.action, "restart");
    }

    #[test]
    fn test_next_attempt_increments() {
        let intent = ActionIntent {
            policy_name: "p".to_string(),
            action: RemediationAction::ScaleUp,
            target: "db-1".to_string(),
            severity: Severity::Warning,
            params: Params::new(),
        };
        let env = TaskEnvelope::first_attempt("task-2", 9, &intent);
        let retry = env.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.task_id, env.task_id);
        assert_eq!(retry.action_id, env.action_id);
    }
}
