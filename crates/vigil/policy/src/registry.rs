//! In-memory authoritative policy set.
//!
//! The registry owns every `Policy` value. Readers receive cloned
//! snapshots in insertion order; mutations are serialized behind one
//! write lock and validated before they touch the set.

use std::sync::RwLock;

use serde::Deserialize;
use tracing::info;
use vigil_types::{Condition, Params, Policy, RemediationAction, Severity};

use crate::error::{PolicyError, Result};
use crate::target;

/// Partial update applied by [`PolicyRegistry::update`]. Absent fields
/// keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyPatch {
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub target: Option<String>,
    pub enabled: Option<bool>,
    pub auto_remediate: Option<bool>,
    pub condition: Option<Condition>,
    pub action: Option<RemediationAction>,
    pub params: Option<Params>,
    pub cooldown_seconds: Option<u64>,
}

/// Thread-safe registry of named policies.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: RwLock<Vec<Policy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new policy. Fails if the name is taken or the policy
    /// does not validate.
    pub fn insert(&self, policy: Policy) -> Result<()> {
        validate(&policy)?;
        let mut policies = self.policies.write().unwrap();
        if policies.iter().any(|p| p.name == policy.name) {
            return Err(PolicyError::AlreadyExists(policy.name));
        }
        info!(
            policy = %policy.name,
            severity = %policy.severity,
            enabled = policy.enabled,
            "Policy registered"
        );
        policies.push(policy);
        Ok(())
    }

    /// Merge recognized fields into an existing policy, atomically.
    /// Readers observe either the old or the new value, never a blend.
    pub fn update(&self, name: &str, patch: PolicyPatch) -> Result<Policy> {
        let mut policies = self.policies.write().unwrap();
        let slot = policies
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| PolicyError::NotFound(name.to_string()))?;

        let mut candidate = slot.clone();
        if let Some(description) = patch.description {
            candidate.description = description;
        }
        if let Some(severity) = patch.severity {
            candidate.severity = severity;
        }
        if let Some(target) = patch.target {
            candidate.target = target;
        }
        if let Some(enabled) = patch.enabled {
            candidate.enabled = enabled;
        }
        if let Some(auto_remediate) = patch.auto_remediate {
            candidate.auto_remediate = auto_remediate;
        }
        if let Some(condition) = patch.condition {
            candidate.condition = condition;
        }
        if let Some(action) = patch.action {
            candidate.action = action;
        }
        if let Some(params) = patch.params {
            candidate.params = params;
        }
        if let Some(cooldown_seconds) = patch.cooldown_seconds {
            candidate.cooldown_seconds = cooldown_seconds;
        }
        validate(&candidate)?;

        info!(policy = %name, "Policy updated");
        *slot = candidate.clone();
        Ok(candidate)
    }

    /// Remove a policy. Missing names are an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut policies = self.policies.write().unwrap();
        let before = policies.len();
        policies.retain(|p| p.name != name);
        if policies.len() == before {
            return Err(PolicyError::NotFound(name.to_string()));
        }
        info!(policy = %name, "Policy deleted");
        Ok(())
    }

    /// Snapshot of one policy.
    pub fn get(&self, name: &str) -> Option<Policy> {
        self.policies
            .read()
            .unwrap()
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Snapshot of every policy in insertion order.
    pub fn list(&self) -> Vec<Policy> {
        self.policies.read().unwrap().clone()
    }

    /// Snapshot of enabled policies in insertion order.
    pub fn enabled(&self) -> Vec<Policy> {
        self.policies
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect()
    }

    /// Snapshot filtered by severity.
    pub fn by_severity(&self, severity: Severity) -> Vec<Policy> {
        self.policies
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.severity == severity)
            .cloned()
            .collect()
    }

    /// Toggle a policy on.
    pub fn enable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true)
    }

    /// Toggle a policy off.
    pub fn disable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut policies = self.policies.write().unwrap();
        let slot = policies
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| PolicyError::NotFound(name.to_string()))?;
        slot.enabled = enabled;
        info!(policy = %name, enabled, "Policy toggled");
        Ok(())
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the full policy set transactionally.
    ///
    /// Every candidate is validated (including duplicate names within the
    /// batch) before the swap; any failure leaves the registry unchanged
    /// and names the offending policies.
    pub fn reload(&self, candidates: Vec<Policy>) -> Result<usize> {
        let mut offending = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for policy in &candidates {
            if let Err(err) = validate(policy) {
                offending.push(format!("{}: {err}", policy.name));
            } else if !seen.insert(policy.name.clone()) {
                offending.push(format!("{}: duplicate name", policy.name));
            }
        }
        if !offending.is_empty() {
            return Err(PolicyError::ReloadRejected {
                detail: format!("{} invalid policies", offending.len()),
                offending,
            });
        }

        let count = candidates.len();
        let mut policies = self.policies.write().unwrap();
        *policies = candidates;
        info!(policies = count, "Policy registry reloaded");
        Ok(count)
    }
}

fn validate(policy: &Policy) -> Result<()> {
    policy
        .validate()
        .and_then(|_| target::validate_pattern(&policy.target))
        .map_err(|source| PolicyError::Invalid {
            name: policy.name.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn policy(name: &str) -> Policy {
        Policy {
            name: name.to_string(),
            description: String::new(),
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
            cooldown_seconds: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("high-cpu")).unwrap();
        assert!(matches!(
            registry.insert(policy("high-cpu")),
            Err(PolicyError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_insert_validates_pattern() {
        let registry = PolicyRegistry::new();
        let mut bad = policy("bad-target");
        bad.target = "a*b".to_string();
        assert!(matches!(
            registry.insert(bad),
            Err(PolicyError::Invalid { .. })
        ));
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let registry = PolicyRegistry::new();
        for name in ["first", "second", "third"] {
            registry.insert(policy(name)).unwrap();
        }
        let names: Vec<_> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_update_merges_fields() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("high-cpu")).unwrap();

        let updated = registry
            .update(
                "high-cpu",
                PolicyPatch {
                    severity: Some(Severity::Critical),
                    cooldown_seconds: Some(120),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.severity, Severity::Critical);
        assert_eq!(updated.cooldown_seconds, 120);
        // Untouched fields survive.
        assert_eq!(updated.target, "all");
    }

    #[test]
    fn test_update_rejects_invalid_patch() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("high-cpu")).unwrap();
        let err = registry.update(
            "high-cpu",
            PolicyPatch {
                target: Some("w*t*".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(PolicyError::Invalid { .. })));
        // Original unchanged.
        assert_eq!(registry.get("high-cpu").unwrap().target, "all");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let registry = PolicyRegistry::new();
        assert!(matches!(
            registry.delete("ghost"),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_enable_disable() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("high-cpu")).unwrap();

        registry.disable("high-cpu").unwrap();
        assert!(!registry.get("high-cpu").unwrap().enabled);
        assert!(registry.enabled().is_empty());

        registry.enable("high-cpu").unwrap();
        assert!(registry.get("high-cpu").unwrap().enabled);
        assert!(matches!(
            registry.enable("ghost"),
            Err(PolicyError::NotFound(_))
        ));
    }

    #[test]
    fn test_by_severity() {
        let registry = PolicyRegistry::new();
        let mut critical = policy("low-disk");
        critical.severity = Severity::Critical;
        registry.insert(policy("high-cpu")).unwrap();
        registry.insert(critical).unwrap();

        let found = registry.by_severity(Severity::Critical);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "low-disk");
    }

    #[test]
    fn test_reload_swaps_atomically() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("old")).unwrap();

        registry
            .reload(vec![policy("new-a"), policy("new-b")])
            .unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["new-a", "new-b"]);
    }

    #[test]
    fn test_reload_rejects_batch_and_keeps_state() {
        let registry = PolicyRegistry::new();
        registry.insert(policy("keeper")).unwrap();

        let mut bad = policy("broken");
        bad.condition = Condition::MetricExceeds {
            metric: String::new(),
            threshold: 1.0,
        };
        let err = registry.reload(vec![policy("fine"), bad]).unwrap_err();
        match err {
            PolicyError::ReloadRejected { offending, .. } => {
                assert_eq!(offending.len(), 1);
                assert!(offending[0].starts_with("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Pre-reload set still visible.
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].name, "keeper");
    }

    #[test]
    fn test_reload_rejects_duplicate_names() {
        let registry = PolicyRegistry::new();
        let err = registry
            .reload(vec![policy("dup"), policy("dup")])
            .unwrap_err();
        assert!(matches!(err, PolicyError::ReloadRejected { .. }));
    }
}
