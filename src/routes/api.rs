use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api::{health_check, list_sessions};
use crate::state::AppState;

/// Create the HTTP API router
///
/// - `GET /` - liveness check
/// - `GET /sessions` - live bridge sessions
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http())
}
