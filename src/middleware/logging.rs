//! One log line per handled request: method, path, status, elapsed time.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Times each request through the rest of the stack and emits a single line
/// once the response is ready. Rejections log at WARN, everything else at
/// INFO. `/health` is never logged.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(%method, %path, status, latency_ms, "request failed");
    } else if status >= 400 {
        warn!(%method, %path, status, latency_ms, "request rejected");
    } else {
        info!(%method, %path, status, latency_ms, "request");
    }

    response
}
