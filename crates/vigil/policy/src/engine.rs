//! The policy engine.
//!
//! Composes the registry, condition evaluation and the cooldown registry
//! into one deterministic evaluation step: metrics in, ordered violations
//! and remediation intents out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use vigil_types::{ActionIntent, Policy, Violation};

use crate::cooldown::CooldownRegistry;
use crate::registry::PolicyRegistry;
use crate::target;

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Policies whose condition held, in registry snapshot order.
    pub violations: Vec<Violation>,

    /// Remediation intents emitted for auto-remediating policies that
    /// cleared their cooldown.
    pub intents: Vec<ActionIntent>,
}

/// Deterministic evaluator over the registry snapshot.
pub struct PolicyEngine {
    registry: Arc<PolicyRegistry>,
    cooldowns: Arc<CooldownRegistry>,
}

impl PolicyEngine {
    pub fn new(registry: Arc<PolicyRegistry>, cooldowns: Arc<CooldownRegistry>) -> Self {
        Self {
            registry,
            cooldowns,
        }
    }

    /// The registry this engine evaluates.
    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Evaluate every enabled policy against `metrics`.
    ///
    /// When `target` is supplied only policies whose pattern matches it
    /// participate, and intents carry that concrete target. Cooldowns are
    /// consulted and marked: a policy still cooling down records its
    /// violation but emits no intent.
    pub fn evaluate(&self, metrics: &BTreeMap<String, f64>, target: Option<&str>) -> Evaluation {
        self.run(metrics, target, true)
    }

    /// Side-effect-free evaluation used by the dry-run API: identical
    /// decision logic, but cooldowns are only read, never marked, and the
    /// caller must not enqueue the returned intents.
    pub fn dry_run(&self, metrics: &BTreeMap<String, f64>, target: Option<&str>) -> Evaluation {
        self.run(metrics, target, false)
    }

    fn run(&self, metrics: &BTreeMap<String, f64>, target: Option<&str>, commit: bool) -> Evaluation {
        let snapshot = self.registry.enabled();
        let mut evaluation = Evaluation::default();

        debug!(
            policies = snapshot.len(),
            metrics = metrics.len(),
            target = target.unwrap_or("all"),
            "Evaluating policies"
        );

        for policy in &snapshot {
            if let Some(concrete) = target {
                if !target::matches(&policy.target, concrete) {
                    continue;
                }
            }

            if !policy.condition.evaluate(metrics) {
                continue;
            }

            let effective_target = target.unwrap_or(&policy.target).to_string();
            warn!(
                policy = %policy.name,
                severity = %policy.severity,
                target = %effective_target,
                "Policy violation detected"
            );
            evaluation.violations.push(Violation {
                policy_name: policy.name.clone(),
                severity: policy.severity,
                description: policy.description.clone(),
                target: effective_target.clone(),
                timestamp: Utc::now(),
            });

            if self.clears_cooldown(policy, &effective_target, commit) {
                if policy.auto_remediate {
                    evaluation.intents.push(ActionIntent {
                        policy_name: policy.name.clone(),
                        action: policy.action,
                        target: effective_target,
                        severity: policy.severity,
                        params: policy.params.clone(),
                    });
                }
            } else {
                debug!(
                    policy = %policy.name,
                    target = %effective_target,
                    "Policy still cooling down, intent suppressed"
                );
            }
        }

        evaluation
    }

    fn clears_cooldown(&self, policy: &Policy, effective_target: &str, commit: bool) -> bool {
        let key = (policy.name.clone(), effective_target.to_string());
        let cooldown = Duration::from_secs(policy.cooldown_seconds);
        if commit {
            self.cooldowns.try_mark(&key, cooldown)
        } else {
            self.cooldowns.ready(&key, cooldown).0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PolicyPatch;
    use vigil_types::{Condition, Params, RemediationAction, Severity};

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn policy(name: &str, condition: Condition) -> Policy {
        Policy {
            name: name.to_string(),
            description: format!("{name} test policy"),
            severity: Severity::Warning,
            target: "all".to_string(),
            enabled: true,
            auto_remediate: true,
            condition,
            action: RemediationAction::Restart,
            params: Params::new(),
            cooldown_seconds: 0,
            created_at: Utc::now(),
        }
    }

    fn exceeds(metric: &str, threshold: f64) -> Condition {
        Condition::MetricExceeds {
            metric: metric.to_string(),
            threshold,
        }
    }

    fn engine_with(policies: Vec<Policy>) -> PolicyEngine {
        let registry = Arc::new(PolicyRegistry::new());
        for p in policies {
            registry.insert(p).unwrap();
        }
        PolicyEngine::new(registry, Arc::new(CooldownRegistry::new()))
    }

    #[test]
    fn test_threshold_fires_with_cooldown_gate() {
        let mut p = policy("high-cpu", exceeds("cpu", 80.0));
        p.cooldown_seconds = 60;
        let engine = engine_with(vec![p]);

        // First breach: violation and intent.
        let first = engine.evaluate(&metrics(&[("cpu", 95.0)]), None);
        assert_eq!(first.violations.len(), 1);
        assert_eq!(first.intents.len(), 1);

        // Still breaching inside the cooldown: violation only.
        let second = engine.evaluate(&metrics(&[("cpu", 90.0)]), None);
        assert_eq!(second.violations.len(), 1);
        assert!(second.intents.is_empty());
    }

    #[test]
    fn test_compound_all_condition() {
        let condition = Condition::All {
            conditions: vec![exceeds("cpu", 80.0), exceeds("mem", 90.0)],
        };
        let engine = engine_with(vec![policy("pressure", condition)]);

        let miss = engine.evaluate(&metrics(&[("cpu", 85.0), ("mem", 80.0)]), None);
        assert!(miss.violations.is_empty());

        let hit = engine.evaluate(&metrics(&[("cpu", 85.0), ("mem", 95.0)]), None);
        assert_eq!(hit.violations.len(), 1);
    }

    #[test]
    fn test_target_glob_filters_and_resolves() {
        let mut p = policy("web-cpu", exceeds("cpu", 80.0));
        p.target = "web-*".to_string();
        let engine = engine_with(vec![p]);

        let matched = engine.evaluate(&metrics(&[("cpu", 99.0)]), Some("web-1"));
        assert_eq!(matched.violations.len(), 1);
        assert_eq!(matched.intents.len(), 1);
        assert_eq!(matched.intents[0].target, "web-1");
        assert_eq!(matched.violations[0].target, "web-1");

        let skipped = engine.evaluate(&metrics(&[("cpu", 99.0)]), Some("db-1"));
        assert!(skipped.violations.is_empty());
        assert!(skipped.intents.is_empty());
    }

    #[test]
    fn test_disabled_policy_is_skipped() {
        let engine = engine_with(vec![policy("high-cpu", exceeds("cpu", 80.0))]);
        engine.registry().disable("high-cpu").unwrap();

        let result = engine.evaluate(&metrics(&[("cpu", 99.0)]), None);
        assert!(result.violations.is_empty());
        assert!(result.intents.is_empty());
    }

    #[test]
    fn test_without_target_intent_uses_policy_pattern() {
        let mut p = policy("web-cpu", exceeds("cpu", 80.0));
        p.target = "web-*".to_string();
        let engine = engine_with(vec![p]);

        let result = engine.evaluate(&metrics(&[("cpu", 99.0)]), None);
        assert_eq!(result.intents.len(), 1);
        assert_eq!(result.intents[0].target, "web-*");
    }

    #[test]
    fn test_auto_remediate_off_suppresses_intent() {
        let mut p = policy("observe-only", exceeds("cpu", 80.0));
        p.auto_remediate = false;
        let engine = engine_with(vec![p]);

        let result = engine.evaluate(&metrics(&[("cpu", 99.0)]), None);
        assert_eq!(result.violations.len(), 1);
        assert!(result.intents.is_empty());
    }

    #[test]
    fn test_violations_follow_snapshot_order() {
        let engine = engine_with(vec![
            policy("alpha", exceeds("cpu", 10.0)),
            policy("beta", exceeds("cpu", 20.0)),
            policy("gamma", exceeds("cpu", 30.0)),
        ]);

        let result = engine.evaluate(&metrics(&[("cpu", 99.0)]), None);
        let names: Vec<_> = result
            .violations
            .iter()
            .map(|v| v.policy_name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_dry_run_has_no_side_effects() {
        let mut p = policy("high-cpu", exceeds("cpu", 80.0));
        p.cooldown_seconds = 60;
        let engine = engine_with(vec![p]);
        let m = metrics(&[("cpu", 95.0)]);

        let first = engine.dry_run(&m, None);
        let second = engine.dry_run(&m, None);
        assert_eq!(first.violations.len(), 1);
        assert_eq!(second.violations.len(), 1);
        assert_eq!(first.intents.len(), 1);
        assert_eq!(second.intents.len(), 1);

        // The cooldown was never marked, so a real evaluation still fires.
        let committed = engine.evaluate(&m, None);
        assert_eq!(committed.intents.len(), 1);
    }

    #[test]
    fn test_update_is_visible_to_next_evaluation() {
        let engine = engine_with(vec![policy("high-cpu", exceeds("cpu", 80.0))]);

        engine
            .registry()
            .update(
                "high-cpu",
                PolicyPatch {
                    condition: Some(exceeds("cpu", 99.5)),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = engine.evaluate(&metrics(&[("cpu", 95.0)]), None);
        assert!(result.violations.is_empty());
    }
}
