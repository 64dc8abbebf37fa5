//! Policy CRUD and evaluation handlers.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_policy::{load_policy_file, PolicyPatch};
use vigil_types::{Params, Policy, Severity, Violation};

use crate::error::{ApiError, ApiResult};
use crate::runner::RunnerStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PolicyListResponse {
    pub count: usize,
    pub policies: Vec<Policy>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub target: Option<String>,
}

/// Intent shape reported by the dry-run endpoint. `status` is always
/// `dry-run`: nothing was enqueued.
#[derive(Debug, Serialize)]
pub struct TriggeredAction {
    pub action: String,
    pub target: String,
    pub status: String,
    pub params: Params,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub ok: bool,
    pub violations: Vec<Violation>,
    pub actions_triggered: Vec<TriggeredAction>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReloadQuery {
    /// Override the configured policy file for this reload.
    #[serde(default)]
    pub path: Option<String>,
}

pub async fn create_policy(
    State(state): State<AppState>,
    Json(policy): Json<Policy>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let name = policy.name.clone();
    state.engine.registry().insert(policy)?;
    let created = state
        .engine
        .registry()
        .get(&name)
        .ok_or_else(|| ApiError::Internal(format!("policy '{name}' vanished after insert")))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_policies(State(state): State<AppState>) -> Json<PolicyListResponse> {
    let policies = state.engine.registry().list();
    Json(PolicyListResponse {
        count: policies.len(),
        policies,
    })
}

pub async fn get_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Policy>> {
    state
        .engine
        .registry()
        .get(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("policy '{name}' not found")))
}

pub async fn update_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(patch): Json<PolicyPatch>,
) -> ApiResult<Json<Policy>> {
    let updated = state.engine.registry().update(&name, patch)?;
    Ok(Json(updated))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.registry().delete(&name)?;
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("policy '{name}' deleted"),
    }))
}

pub async fn enable_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.registry().enable(&name)?;
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("policy '{name}' enabled"),
    }))
}

pub async fn disable_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.registry().disable(&name)?;
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("policy '{name}' disabled"),
    }))
}

/// Transactional reload from the declarative policy file. A rejected
/// document leaves the registry untouched and names the offenders.
pub async fn reload_policies(
    State(state): State<AppState>,
    Query(query): Query<ReloadQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let path = query
        .path
        .map(std::path::PathBuf::from)
        .or_else(|| state.config.policy_file.clone())
        .ok_or_else(|| ApiError::BadRequest("no policy file configured".to_string()))?;

    let candidates = load_policy_file(&path)?;
    let count = state.engine.registry().reload(candidates)?;
    info!(policies = count, path = %path.display(), "Policies reloaded");
    Ok(Json(MessageResponse {
        ok: true,
        message: format!("reloaded {count} policies"),
    }))
}

pub async fn policies_by_severity(
    State(state): State<AppState>,
    Path(severity): Path<String>,
) -> ApiResult<Json<PolicyListResponse>> {
    let severity = severity
        .parse::<Severity>()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let policies = state.engine.registry().by_severity(severity);
    Ok(Json(PolicyListResponse {
        count: policies.len(),
        policies,
    }))
}

/// Dry-run evaluation: identical decision logic to the ingest path but
/// with no persistent side effects. Cooldowns are not marked and nothing
/// is enqueued.
pub async fn evaluate_policies(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<Json<EvaluateResponse>> {
    for (name, value) in &request.metrics {
        if name.is_empty() {
            return Err(ApiError::BadRequest("metric names must not be empty".to_string()));
        }
        if !value.is_finite() {
            return Err(ApiError::Unprocessable(format!(
                "metric '{name}' must be a finite number"
            )));
        }
    }

    let evaluation = state
        .engine
        .dry_run(&request.metrics, request.target.as_deref());

    for violation in &evaluation.violations {
        state.metrics.record_evaluation(&violation.policy_name, true);
    }

    let actions_triggered = evaluation
        .intents
        .iter()
        .map(|intent| TriggeredAction {
            action: intent.action.as_str().to_string(),
            target: intent.target.clone(),
            status: "dry-run".to_string(),
            params: intent.params.clone(),
        })
        .collect();

    Ok(Json(EvaluateResponse {
        ok: true,
        violations: evaluation.violations,
        actions_triggered,
        timestamp: Utc::now(),
    }))
}

pub async fn runner_status(State(state): State<AppState>) -> Json<RunnerStatus> {
    Json(state.runner.status())
}
