//! HTTP handlers and the API router.
//!
//! - `health`: liveness, readiness, metrics and version
//! - `libraries`: library CRUD, imported contents, scan submission
//! - `scan_tasks`: queue inspection, cancellation and the live event stream

pub mod health;
pub mod libraries;
pub mod scan_tasks;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::{rate_limit::rate_limit_middleware, security_headers::security_headers_middleware};
use crate::state::AppState;

/// Request bodies are small JSON documents.
const BODY_LIMIT: usize = 1024 * 1024;

/// All API routes with body limit, global rate limit and security headers.
///
/// Tracing, compression and CORS are added by the binary.
pub fn api_router(state: AppState) -> Router {
    let limiter = state.global_limiter.clone();
    let cfg = state.config.clone();

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/libraries", post(libraries::create_library).get(libraries::list_libraries))
        .route("/libraries/{id}", get(libraries::get_library).delete(libraries::delete_library))
        .route("/libraries/{id}/contents", get(libraries::list_contents))
        .route("/libraries/{id}/scan", post(libraries::scan_library))
        .route("/scan-tasks", get(scan_tasks::list_tasks))
        .route("/scan-tasks/events", get(scan_tasks::task_events))
        .route("/scan-tasks/{id}", get(scan_tasks::get_task).delete(scan_tasks::cancel_task))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(from_fn_with_state(limiter, rate_limit_middleware))
        .layer(from_fn_with_state(cfg, security_headers_middleware))
}
