use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite};
use tokio::time::{self, Duration as TokioDuration};
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leseecke::{config, db, routes, scanner::FsLibraryScanner, scheduler, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging: stdout plus a daily rotated file under ./logs
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "leseecke.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Keep the guards alive so the non-blocking writers flush on exit
    let _log_guards = (stdout_guard, file_guard);

    // embedded defaults -> leseecke.toml -> LESEECKE_CONFIG -> env
    let app_cfg = config::load()?;

    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA temp_store=MEMORY;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(db_url)
        .await?;

    db::init_db(&pool).await?;

    let state = AppState::new(pool.clone(), app_cfg.clone());

    // The single scan worker
    state.queue.spawn_worker(Arc::new(FsLibraryScanner::new(pool.clone(), app_cfg.scanner.clone())));

    let scheduler_handle = if app_cfg.scheduler.enabled {
        Some(scheduler::spawn(state.queue.clone(), pool.clone(), app_cfg.scheduler.clone()))
    } else {
        info!("Periodic library rescans disabled");
        None
    };

    // Periodic cleanup of rate limiter state to avoid unbounded growth
    {
        let global = state.global_limiter.clone();
        let endpoints = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(300));
            loop {
                ticker.tick().await;
                global.cleanup_old_entries().await;
                endpoints.cleanup_all().await;
            }
        });
    }

    // Compression must skip SSE or event streams stall behind the encoder.
    #[derive(Clone)]
    struct NoSseDefault(DefaultPredicate);
    impl Predicate for NoSseDefault {
        fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
            if let Some(ct) = res.headers().get(CONTENT_TYPE) {
                if let Ok(s) = ct.to_str() {
                    if s.starts_with("text/event-stream") {
                        return false;
                    }
                }
            }
            self.0.should_compress(res)
        }
    }
    let compression = CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new()));

    let app = routes::api_router(state.clone()).layer(compression).layer(TraceLayer::new_for_http());

    // CORS: permissive in debug builds for a separately served UI
    let app = if cfg!(debug_assertions) { app.layer(CorsLayer::permissive()) } else { app };

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Leseecke listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the running scan finish; pending tasks are dropped with the process.
    state.queue.shutdown().await;
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
