use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Liveness: no dependencies checked
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness: DB reachable within 5s and the scan worker still alive
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if !state.queue.is_worker_running() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: scan worker not running").into_response();
    }
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot(state.queue.queue_depth()))
}

// Prometheus text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot(state.queue.queue_depth());
    let series: [(&str, &str, &str, u64); 10] = [
        ("tasks_submitted", "counter", "Scan tasks created", m.tasks_submitted),
        ("tasks_deduplicated", "counter", "Submissions joined to an active task", m.tasks_deduplicated),
        ("tasks_upgraded", "counter", "Pending tasks raised to high priority", m.tasks_upgraded),
        ("tasks_completed", "counter", "Scan tasks completed", m.tasks_completed),
        ("tasks_failed", "counter", "Scan tasks failed", m.tasks_failed),
        ("tasks_cancelled", "counter", "Scan tasks cancelled", m.tasks_cancelled),
        ("contents_added", "counter", "Contents imported by scans", m.contents_added),
        ("contents_removed", "counter", "Contents removed by scans", m.contents_removed),
        ("queue_depth", "gauge", "Pending scan tasks", m.queue_depth as u64),
        ("uptime_seconds", "gauge", "Uptime seconds", m.uptime_seconds),
    ];
    let mut body = String::new();
    for (name, kind, help, value) in series {
        body.push_str(&format!(
            "# HELP leseecke_{name} {help}\n# TYPE leseecke_{name} {kind}\nleseecke_{name} {value}\n"
        ));
    }
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
