//! Telephony media-stream route configuration

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream::media_stream_handler;
use crate::middleware::call_limit_middleware;
use crate::state::AppState;

/// Create the media-stream router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for a telephony provider's call
/// audio. Upgrades are refused with 503 while the concurrent-call limit is
/// reached.
///
/// # Protocol
///
/// The provider sends `connected`, `start`, `media` and `stop` events. The
/// bridge answers with `media` (agent audio) and `clear` (barge-in) events
/// addressed to the stream id from `start`.
pub fn create_media_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(middleware::from_fn_with_state(state, call_limit_middleware))
        .layer(TraceLayer::new_for_http())
}
