use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

/// Adds security headers to every response and disables caching of API
/// payloads. HSTS and CSP are only sent when `[security]` enables them.
///
/// SSE streams additionally get `X-Accel-Buffering: no` so reverse proxies
/// forward task events as they happen.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    headers.insert(HeaderName::from_static("x-content-type-options"), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY"));
    headers.insert(HeaderName::from_static("referrer-policy"), HeaderValue::from_static("no-referrer"));
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    if let Some(sec) = cfg.security.as_ref() {
        apply_optional(headers, sec);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|ct| ct.to_str().ok()).map(str::to_owned);
    if let Some(ct) = content_type.as_deref() {
        let is_sse = ct.starts_with("text/event-stream");
        if is_sse || ct.starts_with("application/json") {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        if is_sse {
            headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
        }
    }

    res
}

fn apply_optional(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(31_536_000);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        let value = format!("max-age={}{}", max_age, include_sub);
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("max-age=31536000")),
        );
    }
    if let Some(csp) = sec.csp.as_deref().filter(|c| !c.trim().is_empty()) {
        match HeaderValue::from_str(csp) {
            Ok(val) => {
                headers.insert(HeaderName::from_static("content-security-policy"), val);
            }
            Err(e) => tracing::warn!("Ignoring invalid security.csp value: {}", e),
        }
    }
}
