//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use super::auth::USER_ID_HEADER;

/// Logs every request with its caller, status and timing
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let start = Instant::now();

    tracing::debug!(method = %method, path = %path, user_id = ?user_id, "Request started");

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            user_id = ?user_id,
            status,
            duration_ms = %duration_ms,
            "Request failed"
        );
    } else if response.status().is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            user_id = ?user_id,
            status,
            duration_ms = %duration_ms,
            "Request rejected"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            user_id = ?user_id,
            status,
            duration_ms = %duration_ms,
            "Request completed"
        );
    }

    response
}
