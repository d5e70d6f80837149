use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::{
    error::{validation, AppError, AppResult, OptionExt},
    library,
    middleware::ip::ClientIp,
    queue::{LibraryId, TaskPriority},
    state::{AppState, SCAN_ENDPOINT},
    types::{CreateLibraryRequest, LibraryDto, SubmitScanResponse},
};

pub async fn create_library(
    State(state): State<AppState>,
    Json(req): Json<CreateLibraryRequest>,
) -> AppResult<impl IntoResponse> {
    validation::validate_library_name(&req.name)?;
    validation::validate_paths_exist(&req.scan_paths)?;

    let created = library::create_library(&state.db, req.name.trim(), &req.scan_paths).await?;
    info!("Created library {} ({}) with {} scan path(s)", created.id, created.name, created.scan_paths.len());
    Ok((StatusCode::CREATED, Json(LibraryDto::new(created, None))))
}

pub async fn list_libraries(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let items: Vec<LibraryDto> = library::list_libraries(&state.db)
        .await?
        .into_iter()
        .map(|lib| {
            let active = state.queue.get_library_task(lib.id);
            LibraryDto::new(lib, active)
        })
        .collect();
    Ok(Json(items))
}

pub async fn get_library(State(state): State<AppState>, Path(id): Path<LibraryId>) -> AppResult<impl IntoResponse> {
    let lib = library::get_library(&state.db, id).await?.ok_or_not_found("library")?;
    let active = state.queue.get_library_task(id);
    Ok(Json(LibraryDto::new(lib, active)))
}

/// Cancels the library's active scan, then deletes it with its contents.
pub async fn delete_library(State(state): State<AppState>, Path(id): Path<LibraryId>) -> AppResult<StatusCode> {
    if let Some(task) = state.queue.get_library_task(id) {
        // The task may finish between lookup and cancel; that is fine.
        if let Err(e) = state.queue.cancel_task(task.id) {
            tracing::debug!("Active task of library {} ended before cancel: {}", id, e);
        }
    }
    if !library::delete_library(&state.db, id).await? {
        return Err(AppError::NotFound("library not found".into()));
    }
    info!("Deleted library {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_contents(State(state): State<AppState>, Path(id): Path<LibraryId>) -> AppResult<impl IntoResponse> {
    library::get_library(&state.db, id).await?.ok_or_not_found("library")?;
    Ok(Json(library::list_contents(&state.db, id).await?))
}

/// Submits a high-priority scan. Repeated requests join the active task.
pub async fn scan_library(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<LibraryId>,
) -> AppResult<Response> {
    if let Err((status, body)) = state.rate_limiter.check_endpoint_limit(SCAN_ENDPOINT, ip).await {
        return Ok((status, body).into_response());
    }
    library::get_library(&state.db, id).await?.ok_or_not_found("library")?;

    let task_id = state.queue.submit_task(id, TaskPriority::High);
    // Only tasks past retention are evicted, so a fresh id always resolves.
    let task = state.queue.get_task(task_id).ok_or_not_found("scan task")?;
    Ok((StatusCode::ACCEPTED, Json(SubmitScanResponse { task_id, task })).into_response())
}
