//! Health, stats and metrics handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use vigil_queue::QueueStats;
use vigil_worker::PoolStatus;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "vigil",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

pub async fn worker_status(State(state): State<AppState>) -> Json<PoolStatus> {
    Json(state.pool.status())
}

/// Prometheus text exposition. Queue and worker gauges are refreshed
/// from their authoritative counters on every scrape.
pub async fn export_metrics(State(state): State<AppState>) -> String {
    if let Ok(stats) = state.queue.stats().await {
        state.metrics.observe_queue(&stats);
    }
    state.metrics.observe_pool(&state.pool.status());
    state.metrics.export()
}
