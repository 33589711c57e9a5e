//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, latency, and the
//! resolved principal id when authentication produced one.

use crate::auth::models::PrincipalId;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Middleware that logs HTTP requests with timing information.
///
/// Runs outermost so it observes the final status of every stage, including
/// rate-limit and auth rejections. The principal id arrives via response
/// extensions from the auth middleware.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks to reduce noise
    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();
    let principal = response
        .extensions()
        .get::<PrincipalId>()
        .map(|p| p.0.clone());
    let principal = principal.as_deref().unwrap_or("-");

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            principal_id = principal,
            "Request failed (5xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            principal_id = principal,
            "Request completed"
        );
    }

    response
}
