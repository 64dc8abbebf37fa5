//! Action CRUD handlers.
//!
//! Query-string filtering (`?status=&target=&limit=`) is the normative
//! filter surface; the `/actions/status/{status}` path form delegates to
//! the same storage filter and exists for compatibility.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_storage::{ActionFilter, DEFAULT_LIST_LIMIT};
use vigil_types::{ActionRecord, ActionStatus, MAX_NAME_LEN};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateActionRequest {
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListActionsResponse {
    pub count: usize,
    pub actions: Vec<ActionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ListActionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

fn validate_name(field: &'static str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn parse_status(value: &str) -> ApiResult<ActionStatus> {
    value
        .parse::<ActionStatus>()
        .map_err(|err| ApiError::BadRequest(err.to_string()))
}

pub async fn create_action(
    State(state): State<AppState>,
    Json(payload): Json<CreateActionRequest>,
) -> ApiResult<(StatusCode, Json<ActionRecord>)> {
    validate_name("target", &payload.target)?;
    validate_name("action", &payload.action)?;

    let mut record = ActionRecord::pending(payload.target.trim(), payload.action.trim());
    if let Some(details) = payload.details {
        record = record.with_details(details);
    }

    let id = state.storage.create_action(record).await?;
    let created = state
        .storage
        .get_action(id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("action {id} vanished after create")))?;

    state
        .metrics
        .actions_total
        .with_label_values(&[&created.target, &created.action, created.status.as_str()])
        .inc();
    info!(action_id = id, target = %created.target, action = %created.action, "Action created");

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<ListActionsQuery>,
) -> ApiResult<Json<ListActionsResponse>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let filter = ActionFilter {
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        status,
        target: query.target,
    };
    let actions = state.storage.list_actions(filter).await?;
    Ok(Json(ListActionsResponse {
        count: actions.len(),
        actions,
    }))
}

pub async fn actions_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(query): Query<ListActionsQuery>,
) -> ApiResult<Json<ListActionsResponse>> {
    let status = parse_status(&status)?;
    let filter = ActionFilter {
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        status: Some(status),
        target: query.target,
    };
    let actions = state.storage.list_actions(filter).await?;
    Ok(Json(ListActionsResponse {
        count: actions.len(),
        actions,
    }))
}

pub async fn get_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActionRecord>> {
    let record = state
        .storage
        .get_action(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("action {id} not found")))?;
    Ok(Json(record))
}

pub async fn cancel_action(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ActionRecord>> {
    let record = state.storage.cancel_action(id).await?;
    info!(action_id = id, "Action cancelled");
    Ok(Json(record))
}
