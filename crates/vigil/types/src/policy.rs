//! Policy definitions, violations and remediation intents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Condition, Severity, ValidationError, MAX_NAME_LEN};

/// Opaque parameter map forwarded to the remediator.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Remediation action kinds recognized by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemediationAction {
    #[serde(rename = "scale-up")]
    ScaleUp,

    #[serde(rename = "restart")]
    Restart,

    #[serde(rename = "drain-pod")]
    DrainPod,

    #[serde(rename = "custom")]
    Custom,
}

impl RemediationAction {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::ScaleUp => "scale-up",
            RemediationAction::Restart => "restart",
            RemediationAction::DrainPod => "drain-pod",
            RemediationAction::Custom => "custom",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemediationAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale-up" => Ok(RemediationAction::ScaleUp),
            "restart" => Ok(RemediationAction::Restart),
            "drain-pod" => Ok(RemediationAction::DrainPod),
            "custom" => Ok(RemediationAction::Custom),
            other => Err(ValidationError::Unrecognized {
                field: "action",
                value: other.to_string(),
            }),
        }
    }
}

/// A named rule pairing a condition with a remediation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Violation severity.
    pub severity: Severity,

    /// Target pattern: literal, `*`, `prefix-*`, `*-suffix`, or `all`.
    #[serde(default = "default_target")]
    pub target: String,

    /// Whether the policy participates in evaluation.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether a firing policy emits a remediation intent.
    #[serde(default = "default_true")]
    pub auto_remediate: bool,

    /// The condition tree evaluated against metric mappings.
    pub condition: Condition,

    /// Remediation action emitted on violation.
    pub action: RemediationAction,

    /// Opaque parameters forwarded with the action.
    #[serde(default)]
    pub params: Params,

    /// Minimum seconds between successive emissions per (policy, target).
    #[serde(default)]
    pub cooldown_seconds: u64,

    /// Registry insertion time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_target() -> String {
    "all".to_string()
}

fn default_true() -> bool {
    true
}

impl Policy {
    /// Validate name and condition structure. Target pattern validity is
    /// checked by the registry, which owns the matching rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }
        self.condition.validate()
    }
}

/// Evidence that a policy condition held during one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub policy_name: String,
    pub severity: Severity,
    pub description: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

/// A remediation request produced by a firing policy.
///
/// Intents are transient: the producer turns each one into a persisted
/// action record plus a queued task envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub policy_name: String,
    pub action: RemediationAction,
    pub target: String,
    pub severity: Severity,
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_policy() -> Policy {
        Policy {
            name: "high-cpu".to_string(),
            description: "CPU above threshold".to_string(),
            severity: Severity::Warning,
            target: "all".to_string(),
            enabled: true,
            auto_remediate: true,
            condition: Condition::MetricExceeds {
                metric: "cpu".to_string(),
                threshold: 80.0,
            },
            action: RemediationAction::Restart,
            params: Params::new(),
            cooldown_seconds: 60,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_policy_validate() {
        assert!(sample_policy().validate().is_ok());

        let mut unnamed = sample_policy();
        unnamed.name = " ".to_string();
        assert!(unnamed.validate().is_err());

        let mut bad_condition = sample_policy();
        bad_condition.condition = Condition::MetricExceeds {
            metric: String::new(),
            threshold: 1.0,
        };
        assert!(bad_condition.validate().is_err());
    }

    #[test]
    fn test_action_wire_names() {
        for action in [
            RemediationAction::ScaleUp,
            RemediationAction::Restart,
            RemediationAction::DrainPod,
            RemediationAction::Custom,
        ] {
            assert_eq!(action.as_str().parse::<RemediationAction>().unwrap(), action);
        }
        assert!("reboot".parse::<RemediationAction>().is_err());
    }

    #[test]
    fn test_policy_deserialization_defaults() {
        let json = r#"{
            "name": "low-disk",
            "severity": "critical",
            "condition": {"type": "metric_below", "metric": "disk_free", "threshold": 5.0},
            "action": "drain-pod"
        }"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.target, "all");
        assert!(policy.enabled);
        assert!(policy.auto_remediate);
        assert_eq!(policy.cooldown_seconds, 0);
    }
}
