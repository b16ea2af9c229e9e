//! Concurrent-call limit for the media-stream route
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use voice_bridge::middleware::call_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         call_limit_middleware,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Reject WebSocket upgrades with 503 once `max_concurrent_calls` sessions
/// are live. Other requests pass through unchecked.
pub async fn call_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if is_ws_upgrade && state.at_capacity() {
        tracing::warn!(
            active = state.sessions.len(),
            limit = state.config.max_concurrent_calls.unwrap_or_default(),
            "Rejecting call: concurrent call limit reached"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server at capacity. Please try again later.",
        )
            .into_response();
    }

    next.run(request).await
}
