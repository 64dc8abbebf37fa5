//! Action records and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Lifecycle state of a remediation action.
///
/// Transitions form a DAG:
///
/// ```text
/// pending ──claim──▶ running ──success──▶ completed
///    │                  │
///    │                  ├──transient-failure──▶ pending (attempts + 1)
///    │                  └──permanent-failure──▶ failed
///    └──cancel──▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    /// Stable lowercase name used in API payloads and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Cancelled
        )
    }

    /// Whether the lifecycle DAG permits moving to `next` from here.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Pending, ActionStatus::Running)
                | (ActionStatus::Pending, ActionStatus::Cancelled)
                | (ActionStatus::Running, ActionStatus::Completed)
                | (ActionStatus::Running, ActionStatus::Failed)
                | (ActionStatus::Running, ActionStatus::Pending)
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "running" => Ok(ActionStatus::Running),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            "cancelled" => Ok(ActionStatus::Cancelled),
            other => Err(ValidationError::Unrecognized {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted remediation action.
///
/// `id` is repository-assigned and never reused. Everything except
/// `status`, `details`, `updated_at`, `attempts` and `last_error` is
/// immutable after creation. `attempts` is the 1-based delivery attempt
/// the record is on; it increments only on the transient-failure
/// transition and therefore always matches the attempt number of the
/// envelope that will execute next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: i64,
    pub target: String,
    pub action: String,
    pub status: ActionStatus,
    pub details: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ActionRecord {
    /// Build a fresh pending record. The repository assigns the id.
    pub fn pending(target: impl Into<String>, action: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            target: target.into(),
            action: action.into(),
            status: ActionStatus::Pending,
            details: None,
            started_at: now,
            updated_at: now,
            attempts: 1,
            last_error: None,
        }
    }

    /// Attach a details payload.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Running.is_terminal());
        assert!(ActionStatus::Completed.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transition_dag() {
        use ActionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Running));
        assert!(!Running.can_transition_to(Cancelled));
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            ActionStatus::Pending,
            ActionStatus::Running,
            ActionStatus::Completed,
            ActionStatus::Failed,
            ActionStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<ActionStatus>().unwrap(), s);
        }
        assert!("done".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn test_pending_record() {
        let record = ActionRecord::pending("web-1", "restart").with_details("high cpu");
        assert_eq!(record.status, ActionStatus::Pending);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.details.as_deref(), Some("high cpu"));
    }
}
