//! Metric samples produced by telemetry ingest.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ValidationError, MAX_NAME_LEN};

/// A single numeric telemetry sample.
///
/// Samples are immutable once ingested; the engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Repository-assigned identifier (0 until persisted).
    #[serde(default)]
    pub id: i64,

    /// Metric name, e.g. `cpu_usage`.
    pub name: String,

    /// Numeric value. Always finite.
    pub value: f64,

    /// Free-form tags for categorization, e.g. `target = web-1`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Server receipt time unless the producer supplied one.
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Build a validated sample stamped with the current wall clock.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        tags: BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name(&name)?;
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field: "value" });
        }
        Ok(Self {
            id: 0,
            name,
            value,
            tags,
            timestamp: Utc::now(),
        })
    }

    /// The remediation target this sample was reported for, if tagged.
    pub fn target(&self) -> Option<&str> {
        self.tags.get("target").map(String::as_str)
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty { field: "name" });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name",
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}
