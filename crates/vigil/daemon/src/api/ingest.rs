//! Metric ingestion handler.
//!
//! Persists the sample, then evaluates policies synchronously. Intents
//! are enqueued for the worker pool; the remediator is never called on
//! this path, and an evaluation failure never fails the ingest.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use vigil_types::{MetricSample, ValidationError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestMetricRequest {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct IngestMetricResponse {
    pub ok: bool,
    pub metric_id: i64,
    pub message: String,
}

pub async fn ingest_metric(
    State(state): State<AppState>,
    Json(payload): Json<IngestMetricRequest>,
) -> ApiResult<(StatusCode, Json<IngestMetricResponse>)> {
    let sample = MetricSample::new(
        payload.name.trim(),
        payload.value,
        payload.tags.unwrap_or_default(),
    )
    .map_err(|err| match err {
        ValidationError::NotFinite { .. } => ApiError::Unprocessable(err.to_string()),
        other => ApiError::BadRequest(other.to_string()),
    })?;

    let target = sample.target().map(str::to_string);
    let name = sample.name.clone();
    let value = sample.value;

    let metric_id = state.storage.insert_metric(sample).await?;
    state.metrics.ingest_total.inc();
    info!(metric_id, metric = %name, value, "Metric ingested");

    // Evaluate synchronously against this sample alone; the runner
    // covers time-windowed conditions over the recent history.
    let mut metrics = BTreeMap::new();
    metrics.insert(name.clone(), value);
    let evaluation = state.engine.evaluate(&metrics, target.as_deref());

    for violation in &evaluation.violations {
        state.metrics.record_evaluation(&violation.policy_name, true);
    }

    for intent in &evaluation.intents {
        match state.producer.submit(intent).await {
            Ok(_) => {
                state
                    .metrics
                    .actions_total
                    .with_label_values(&[&intent.target, intent.action.as_str(), "pending"])
                    .inc();
            }
            Err(err) => {
                // The sample is already stored; remediation failure is
                // the worker loop's problem to surface, not the ingest's.
                error!(
                    policy = %intent.policy_name,
                    target = %intent.target,
                    %err,
                    "Failed to submit remediation intent"
                );
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(IngestMetricResponse {
            ok: true,
            metric_id,
            message: "Metric ingested successfully".to_string(),
        }),
    ))
}
