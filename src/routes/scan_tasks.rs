use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use futures::Stream;
use serde_json::json;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{
    error::{validation, AppResult, OptionExt},
    queue::TaskId,
    state::AppState,
    types::{HistoryQuery, ScanTaskList},
};

/// `{pending, history}`; `limit` defaults to `queue.history_limit`.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    validation::validate_positive_number(q.limit, "limit")?;
    let cfg = &state.config.queue;
    let limit = q
        .limit
        .map(|l| usize::try_from(l).unwrap_or(cfg.max_history_limit))
        .unwrap_or(cfg.history_limit)
        .clamp(1, cfg.max_history_limit);

    Ok(Json(ScanTaskList { pending: state.queue.list_pending(), history: state.queue.list_history(limit) }))
}

pub async fn get_task(State(state): State<AppState>, Path(id): Path<TaskId>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.queue.get_task(id).ok_or_not_found("scan task")?))
}

/// 404 for unknown ids, 409 for tasks that already finished. A running task
/// comes back still `running` with `cancel_requested` set.
pub async fn cancel_task(State(state): State<AppState>, Path(id): Path<TaskId>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.queue.cancel_task(id)?))
}

/// Live queue events. Slow subscribers silently skip what they missed.
pub async fn task_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.queue.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|res| res.ok()).map(|ev| {
        let data = serde_json::to_string(&ev)
            .unwrap_or_else(|_| json!({"type": "error", "message": "serialization error"}).to_string());
        Ok::<Event, Infallible>(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("keep-alive"))
}
