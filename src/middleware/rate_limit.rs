use super::ip::extract_ip_from_headers;
use axum::{
    extract::{connect_info::ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Sliding-window request limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records the request if allowed; otherwise returns the 429 response to send.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let timestamps = requests.entry(ip).or_default();

        // On clock skew keep the timestamp rather than forgetting it.
        timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after = match now.checked_duration_since(oldest) {
                Some(elapsed) => self.window.saturating_sub(elapsed),
                None => Duration::from_secs(1),
            };
            let retry_secs = retry_after.as_secs().max(1);

            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": format!("Too many requests. Please retry after {} seconds", retry_secs),
                    },
                    "retry_after_seconds": retry_secs,
                    "status": 429,
                })),
            ));
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drops timestamps outside the window and IPs left with none.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.checked_duration_since(t).map(|d| d < self.window).unwrap_or(true));
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    pub(crate) async fn tracked_ips(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Global per-IP limit, configured from `[rate_limit]`.
pub async fn rate_limit_middleware(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);

    match limiter.check_rate_limit(ip).await {
        Ok(()) => next.run(req).await,
        Err((status, body)) => (status, body).into_response(),
    }
}

/// Named limiters for individual endpoints, checked by the handlers themselves.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    limiters: Arc<RwLock<HashMap<String, RateLimiter>>>,
}

impl Default for EndpointRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self { limiters: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Adds or replaces limits as `(endpoint, max_requests, window_seconds)`.
    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut limiters_map = match Arc::try_unwrap(self.limiters) {
            Ok(rwlock) => rwlock.into_inner(),
            Err(arc) => arc.try_read().map(|guard| guard.clone()).unwrap_or_default(),
        };

        for (endpoint, max_requests, window_seconds) in limits {
            limiters_map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }

        Self { limiters: Arc::new(RwLock::new(limiters_map)) }
    }

    /// Endpoints without a configured limit always pass.
    pub async fn check_endpoint_limit(
        &self,
        endpoint: &str,
        ip: IpAddr,
    ) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
        let limiter = self.limiters.read().await.get(endpoint).cloned();
        match limiter {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        // Clone out the limiters so the map lock is not held across awaits.
        let snapshot: Vec<RateLimiter> = {
            let limiters = self.limiters.read().await;
            limiters.values().cloned().collect()
        };
        for limiter in snapshot {
            limiter.cleanup_old_entries().await;
        }
    }
}
