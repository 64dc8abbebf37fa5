//! Composable boolean conditions over metric mappings.
//!
//! Conditions form a finite tree evaluated against a `name → value` map.
//! Evaluation is pure and total: a missing metric makes the leaf false, it
//! never raises. Unknown condition types are rejected at parse time by the
//! tagged representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ValidationError, MAX_CONDITION_DEPTH, MAX_NAME_LEN};

/// A recursive boolean formula over a metric mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// True iff the metric is present and strictly above the threshold.
    MetricExceeds { metric: String, threshold: f64 },

    /// True iff the metric is present and strictly below the threshold.
    MetricBelow { metric: String, threshold: f64 },

    /// True iff non-empty and every child is true.
    All { conditions: Vec<Condition> },

    /// True iff at least one child is true. Empty is false.
    Any { conditions: Vec<Condition> },
}

impl Condition {
    /// Evaluate against a metric mapping with short-circuit semantics.
    pub fn evaluate(&self, metrics: &BTreeMap<String, f64>) -> bool {
        match self {
            Condition::MetricExceeds { metric, threshold } => metrics
                .get(metric)
                .map(|v| *v > *threshold)
                .unwrap_or(false),
            Condition::MetricBelow { metric, threshold } => metrics
                .get(metric)
                .map(|v| *v < *threshold)
                .unwrap_or(false),
            Condition::All { conditions } => {
                !conditions.is_empty() && conditions.iter().all(|c| c.evaluate(metrics))
            }
            Condition::Any { conditions } => conditions.iter().any(|c| c.evaluate(metrics)),
        }
    }

    /// Check structural validity: finite thresholds, non-empty metric
    /// names, nesting bounded by [`MAX_CONDITION_DEPTH`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(ValidationError::TooDeep {
                max: MAX_CONDITION_DEPTH,
            });
        }
        match self {
            Condition::MetricExceeds { metric, threshold }
            | Condition::MetricBelow { metric, threshold } => {
                if metric.is_empty() {
                    return Err(ValidationError::Empty { field: "metric" });
                }
                if metric.len() > MAX_NAME_LEN {
                    return Err(ValidationError::TooLong {
                        field: "metric",
                        max: MAX_NAME_LEN,
                    });
                }
                if !threshold.is_finite() {
                    return Err(ValidationError::NotFinite { field: "threshold" });
                }
                Ok(())
            }
            Condition::All { conditions } | Condition::Any { conditions } => {
                for child in conditions {
                    child.validate_at(depth + 1)?;
                }
                Ok(())
            }
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Condition::MetricExceeds { .. } | Condition::MetricBelow { .. } => 1,
            Condition::All { conditions } | Condition::Any { conditions } => {
                1 + conditions.iter().map(Condition::node_count).sum::<usize>()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn exceeds(metric: &str, threshold: f64) -> Condition {
        Condition::MetricExceeds {
            metric: metric.to_string(),
            threshold,
        }
    }

    fn below(metric: &str, threshold: f64) -> Condition {
        Condition::MetricBelow {
            metric: metric.to_string(),
            threshold,
        }
    }

    #[test]
    fn test_exceeds_is_strict() {
        let cond = exceeds("cpu", 80.0);
        assert!(cond.evaluate(&metrics(&[("cpu", 80.1)])));
        assert!(!cond.evaluate(&metrics(&[("cpu", 80.0)])));
        assert!(!cond.evaluate(&metrics(&[("cpu", 79.9)])));
    }

    #[test]
    fn test_below_is_strict() {
        let cond = below("disk_free", 10.0);
        assert!(cond.evaluate(&metrics(&[("disk_free", 9.9)])));
        assert!(!cond.evaluate(&metrics(&[("disk_free", 10.0)])));
    }

    #[test]
    fn test_missing_metric_is_false() {
        assert!(!exceeds("cpu", 80.0).evaluate(&metrics(&[("mem", 99.0)])));
        assert!(!below("cpu", 80.0).evaluate(&metrics(&[])));
    }

    #[test]
    fn test_all_requires_every_child() {
        let cond = Condition::All {
            conditions: vec![exceeds("cpu", 80.0), exceeds("mem", 90.0)],
        };
        assert!(!cond.evaluate(&metrics(&[("cpu", 85.0), ("mem", 80.0)])));
        assert!(cond.evaluate(&metrics(&[("cpu", 85.0), ("mem", 95.0)])));
    }

    #[test]
    fn test_any_requires_one_child() {
        let cond = Condition::Any {
            conditions: vec![exceeds("cpu", 80.0), exceeds("mem", 90.0)],
        };
        assert!(cond.evaluate(&metrics(&[("cpu", 85.0), ("mem", 10.0)])));
        assert!(!cond.evaluate(&metrics(&[("cpu", 10.0), ("mem", 10.0)])));
    }

    #[test]
    fn test_empty_combinators_are_false() {
        let all = Condition::All { conditions: vec![] };
        let any = Condition::Any { conditions: vec![] };
        let m = metrics(&[("cpu", 99.0)]);
        assert!(!all.evaluate(&m));
        assert!(!any.evaluate(&m));
    }

    #[test]
    fn test_validate_rejects_bad_leaves() {
        assert!(exceeds("", 1.0).validate().is_err());
        assert!(exceeds("cpu", f64::NAN).validate().is_err());
        assert!(below("cpu", f64::NEG_INFINITY).validate().is_err());
        assert!(exceeds("cpu", 1.0).validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_depth() {
        let mut cond = exceeds("cpu", 1.0);
        for _ in 0..MAX_CONDITION_DEPTH {
            cond = Condition::All {
                conditions: vec![cond],
            };
        }
        assert!(cond.validate().is_err());

        let mut shallow = exceeds("cpu", 1.0);
        for _ in 0..MAX_CONDITION_DEPTH - 1 {
            shallow = Condition::All {
                conditions: vec![shallow],
            };
        }
        assert!(shallow.validate().is_ok());
    }

    #[test]
    fn test_unknown_tag_rejected_at_parse() {
        let err = serde_json::from_str::<Condition>(
            r#"{"type": "metric_equals", "metric": "cpu", "threshold": 1.0}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_tagged_round_trip() {
        let cond = Condition::Any {
            conditions: vec![
                exceeds("cpu", 80.0),
                Condition::All {
                    conditions: vec![below("mem_free", 5.0), exceeds("swap", 50.0)],
                },
            ],
        };
        let json = serde_json::to_string(&cond).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
        assert_eq!(cond.node_count(), 5);
    }
}
