//! REST API surface.

mod actions;
mod ingest;
mod policies;
mod system;

use axum::extract::State;
use axum::middleware::{self, Next};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the daemon router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(system::health_check))
        // Ingest
        .route("/ingest", post(ingest::ingest_metric))
        // Actions
        .route(
            "/actions",
            post(actions::create_action).get(actions::list_actions),
        )
        .route("/actions/status/:status", get(actions::actions_by_status))
        .route("/actions/:id", get(actions::get_action))
        .route("/actions/:id/cancel", post(actions::cancel_action))
        // Policies
        .route(
            "/policies",
            post(policies::create_policy).get(policies::list_policies),
        )
        .route("/policies/evaluate", post(policies::evaluate_policies))
        .route("/policies/reload", post(policies::reload_policies))
        .route("/policies/runner/status", get(policies::runner_status))
        .route(
            "/policies/severity/:severity",
            get(policies::policies_by_severity),
        )
        .route(
            "/policies/:name",
            get(policies::get_policy)
                .put(policies::update_policy)
                .delete(policies::delete_policy),
        )
        .route("/policies/:name/enable", put(policies::enable_policy))
        .route("/policies/:name/disable", put(policies::disable_policy))
        // Queue and workers
        .route("/queue/stats", get(system::queue_stats))
        .route("/workers/status", get(system::worker_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(system::export_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            count_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn count_requests(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> axum::response::Response {
    state.metrics.requests_total.inc();
    next.run(request).await
}
