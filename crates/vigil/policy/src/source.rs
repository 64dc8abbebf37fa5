//! Declarative policy sources.
//!
//! A policy file is a YAML (or JSON) document with a top-level `policies`
//! list. Parsing produces candidate [`Policy`] values; validation and the
//! atomic swap belong to the registry's `reload`.
//!
//! ```yaml
//! policies:
//!   - name: high-cpu
//!     description: Restart hosts running hot
//!     severity: warning
//!     target: web-*
//!     action: restart
//!     cooldown_seconds: 60
//!     condition:
//!       type: metric_exceeds
//!       metric: cpu_usage
//!       threshold: 90
//! ```

use std::path::Path;

use serde::Deserialize;
use vigil_types::Policy;

use crate::error::{PolicyError, Result};

/// Top-level shape of a declarative policy document.
#[derive(Debug, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// Parse a document from text. `json` selects the JSON parser; YAML
/// otherwise (YAML is a superset for our purposes, but errors differ).
pub fn parse_policy_document(text: &str, json: bool) -> Result<Vec<Policy>> {
    let document: PolicyDocument = if json {
        serde_json::from_str(text).map_err(|e| PolicyError::ReloadRejected {
            detail: format!("malformed JSON policy document: {e}"),
            offending: Vec::new(),
        })?
    } else {
        serde_yaml::from_str(text).map_err(|e| PolicyError::ReloadRejected {
            detail: format!("malformed YAML policy document: {e}"),
            offending: Vec::new(),
        })?
    };
    Ok(document.policies)
}

/// Read and parse a policy file, selecting the parser by extension.
pub fn load_policy_file(path: &Path) -> Result<Vec<Policy>> {
    let text = std::fs::read_to_string(path).map_err(|e| PolicyError::ReloadRejected {
        detail: format!("cannot read policy file {}: {e}", path.display()),
        offending: Vec::new(),
    })?;
    let json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    parse_policy_document(&text, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{Condition, RemediationAction, Severity};

    const YAML_DOC: &str = r#"
policies:
  - name: high-cpu
    description: Restart hosts running hot
    severity: warning
    target: web-*
    action: restart
    cooldown_seconds: 60
    condition:
      type: metric_exceeds
      metric: cpu_usage
      threshold: 90
  - name: low-disk
    severity: critical
    action: drain-pod
    condition:
      type: all
      conditions:
        - type: metric_below
          metric: disk_free_percent
          threshold: 5
        - type: metric_exceeds
          metric: disk_growth_rate
          threshold: 0.5
"#;

    #[test]
    fn test_parse_yaml_document() {
        let policies = parse_policy_document(YAML_DOC, false).unwrap();
        assert_eq!(policies.len(), 2);

        let high_cpu = &policies[0];
        assert_eq!(high_cpu.name, "high-cpu");
        assert_eq!(high_cpu.severity, Severity::Warning);
        assert_eq!(high_cpu.target, "web-*");
        assert_eq!(high_cpu.action, RemediationAction::Restart);
        assert_eq!(high_cpu.cooldown_seconds, 60);

        let low_disk = &policies[1];
        assert_eq!(low_disk.target, "all");
        assert!(matches!(low_disk.condition, Condition::All { .. }));
    }

    #[test]
    fn test_parse_json_document() {
        let json = r#"{
            "policies": [{
                "name": "mem-pressure",
                "severity": "info",
                "action": "scale-up",
                "condition": {"type": "metric_exceeds", "metric": "mem", "threshold": 90}
            }]
        }"#;
        let policies = parse_policy_document(json, true).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].action, RemediationAction::ScaleUp);
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        assert!(parse_policy_document("policies: [", false).is_err());
        assert!(parse_policy_document("{\"policies\": [{}]}", true).is_err());
    }

    #[test]
    fn test_unknown_condition_type_is_rejected() {
        let doc = r#"
policies:
  - name: weird
    severity: info
    action: custom
    condition:
      type: metric_average
      metric: cpu
      threshold: 1
"#;
        assert!(parse_policy_document(doc, false).is_err());
    }

    #[test]
    fn test_empty_document_yields_no_policies() {
        let policies = parse_policy_document("policies: []", false).unwrap();
        assert!(policies.is_empty());
    }
}
