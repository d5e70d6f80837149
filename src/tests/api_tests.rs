#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::queue::TaskStatus;
    use crate::routes::api_router;
    use crate::scanner::FsLibraryScanner;
    use crate::state::AppState;
    use crate::tests::support::{memory_pool, test_state, wait_for_status};

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Creates a library over `dir` and returns its id.
    async fn create_library(app: &Router, dir: &TempDir) -> i64 {
        let response = send(
            app,
            Method::POST,
            "/libraries",
            Some(json!({"name": "Manga", "scan_paths": [dir.path().to_string_lossy()]})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_libraries() {
        let dir = TempDir::new().unwrap();
        let app = api_router(test_state().await);

        let id = create_library(&app, &dir).await;

        let response = send(&app, Method::GET, "/libraries", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let list = json_body(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], id);
        assert_eq!(list[0]["name"], "Manga");
        assert!(list[0]["active_task"].is_null());
    }

    #[tokio::test]
    async fn test_create_library_validation() {
        let app = api_router(test_state().await);

        let response = send(
            &app,
            Method::POST,
            "/libraries",
            Some(json!({"name": "Missing", "scan_paths": ["/definitely/not/here"]})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["field"], "scan_paths");

        let dir = TempDir::new().unwrap();
        let response = send(
            &app,
            Method::POST,
            "/libraries",
            Some(json!({"name": "  ", "scan_paths": [dir.path().to_string_lossy()]})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["details"]["field"], "name");
    }

    #[tokio::test]
    async fn test_scan_submission_deduplicates() {
        let dir = TempDir::new().unwrap();
        let app = api_router(test_state().await);
        let id = create_library(&app, &dir).await;
        let uri = format!("/libraries/{}/scan", id);

        let response = send(&app, Method::POST, &uri, None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let first = json_body(response).await;
        assert_eq!(first["task"]["status"], "pending");
        assert_eq!(first["task"]["priority"], "high");
        assert_eq!(first["task"]["library_id"], id);
        assert_eq!(first["task_id"], first["task"]["id"]);

        let second = json_body(send(&app, Method::POST, &uri, None).await).await;
        assert_eq!(second["task_id"], first["task_id"]);

        let lib = json_body(send(&app, Method::GET, &format!("/libraries/{}", id), None).await).await;
        assert_eq!(lib["active_task"]["id"], first["task_id"]);
    }

    #[tokio::test]
    async fn test_scan_unknown_library_is_not_found() {
        let app = api_router(test_state().await);
        let response = send(&app, Method::POST, "/libraries/999/scan", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_scan_tasks() {
        let dir = TempDir::new().unwrap();
        let app = api_router(test_state().await);
        let id = create_library(&app, &dir).await;
        let task = json_body(send(&app, Method::POST, &format!("/libraries/{}/scan", id), None).await).await;

        let response = send(&app, Method::GET, "/scan-tasks", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pending"][0]["id"], task["task_id"]);
        assert!(body["history"].as_array().unwrap().is_empty());

        let response = send(&app, Method::GET, "/scan-tasks?limit=100000", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/scan-tasks?limit=0", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_and_cancel_scan_task() {
        let dir = TempDir::new().unwrap();
        let app = api_router(test_state().await);
        let id = create_library(&app, &dir).await;
        let submitted = json_body(send(&app, Method::POST, &format!("/libraries/{}/scan", id), None).await).await;
        let task_uri = format!("/scan-tasks/{}", submitted["task_id"].as_str().unwrap());

        let response = send(&app, Method::GET, &task_uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "pending");

        let response = send(&app, Method::DELETE, &task_uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cancelled = json_body(response).await;
        assert_eq!(cancelled["status"], "cancelled");
        assert!(cancelled["completed_at"].is_string());

        let response = send(&app, Method::DELETE, &task_uri, None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"]["code"], "CONFLICT");

        let history = json_body(send(&app, Method::GET, "/scan-tasks", None).await).await;
        assert_eq!(history["history"][0]["id"], submitted["task_id"]);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_task_ids() {
        let app = api_router(test_state().await);
        let unknown = format!("/scan-tasks/{}", uuid::Uuid::new_v4());

        assert_eq!(send(&app, Method::GET, &unknown, None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&app, Method::DELETE, &unknown, None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&app, Method::GET, "/scan-tasks/not-a-uuid", None).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scan_imports_contents_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Series/Vol 1")).unwrap();
        fs::write(dir.path().join("Series/Vol 1/001.cbz"), b"x").unwrap();
        fs::write(dir.path().join("Series/002.cbz"), b"x").unwrap();
        fs::write(dir.path().join("oneshot.epub"), b"x").unwrap();

        let pool = memory_pool().await;
        let cfg = AppConfig::default();
        let state = AppState::new(pool.clone(), cfg.clone());
        state.queue.spawn_worker(Arc::new(FsLibraryScanner::new(pool, cfg.scanner)));
        let app = api_router(state.clone());

        let id = create_library(&app, &dir).await;
        let submitted = json_body(send(&app, Method::POST, &format!("/libraries/{}/scan", id), None).await).await;
        let task_id = submitted["task_id"].as_str().unwrap().parse().unwrap();

        let task = wait_for_status(&state.queue, task_id, TaskStatus::Completed).await;
        let summary = task.result.unwrap();
        assert_eq!(summary.added_count, 2);
        assert_eq!(summary.added_chapters.len(), 3);

        let contents = json_body(send(&app, Method::GET, &format!("/libraries/{}/contents", id), None).await).await;
        let titles: Vec<&str> = contents.as_array().unwrap().iter().map(|c| c["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["oneshot", "Series"]);
        assert_eq!(contents[1]["chapter_count"], 2);
        state.queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_library_cancels_its_task() {
        let dir = TempDir::new().unwrap();
        let state = test_state().await;
        let app = api_router(state.clone());
        let id = create_library(&app, &dir).await;
        let submitted = json_body(send(&app, Method::POST, &format!("/libraries/{}/scan", id), None).await).await;

        let response = send(&app, Method::DELETE, &format!("/libraries/{}", id), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let task_id = submitted["task_id"].as_str().unwrap().parse().unwrap();
        assert_eq!(state.queue.get_task(task_id).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(send(&app, Method::GET, &format!("/libraries/{}", id), None).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&app, Method::DELETE, &format!("/libraries/{}", id), None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_endpoint_rate_limit() {
        let dir = TempDir::new().unwrap();
        let mut cfg = AppConfig::default();
        cfg.rate_limit.scan_requests_per_minute = 2;
        let app = api_router(AppState::new(memory_pool().await, cfg));
        let id = create_library(&app, &dir).await;
        let uri = format!("/libraries/{}/scan", id);

        assert_eq!(send(&app, Method::POST, &uri, None).await.status(), StatusCode::ACCEPTED);
        assert_eq!(send(&app, Method::POST, &uri, None).await.status(), StatusCode::ACCEPTED);
        let response = send(&app, Method::POST, &uri, None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_security_headers_and_event_stream() {
        let app = api_router(test_state().await);

        let response = send(&app, Method::GET, "/scan-tasks", None).await;
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["cache-control"], "no-store");

        let response = send(&app, Method::GET, "/scan-tasks/events", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
        assert_eq!(response.headers()["x-accel-buffering"], "no");
    }
}
