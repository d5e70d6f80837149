use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::rate_limit::{EndpointRateLimiter, RateLimiter};
use crate::queue::ScanQueue;

/// Path key for the per-endpoint limit on scan submissions.
pub const SCAN_ENDPOINT: &str = "/libraries/{id}/scan";

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    /// The single scan queue. Its worker is started separately by the binary.
    pub queue: ScanQueue,
    /// Same counters the queue updates.
    pub metrics: Metrics,
    /// Global per-IP limiter applied to every request.
    pub global_limiter: RateLimiter,
    /// Per-endpoint limits on top of the global one.
    pub rate_limiter: EndpointRateLimiter,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let metrics = Metrics::new();
        let queue = ScanQueue::new(&config.queue, metrics.clone());
        let global_limiter = RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_seconds);
        let rate_limiter = EndpointRateLimiter::new()
            .with_limits(vec![(SCAN_ENDPOINT, config.rate_limit.scan_requests_per_minute, 60)]);

        Self { db, config: Arc::new(config), queue, metrics, global_limiter, rate_limiter }
    }
}
