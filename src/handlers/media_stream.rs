//! Telephony media-stream WebSocket handler
//!
//! Each accepted socket becomes one bridge session. The session is
//! registered for its whole lifetime and runs on the connection's task.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::info;

use crate::core::bridge::{BridgeSession, Leg};
use crate::core::telephony::TELEPHONY_LEG;
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Upgrade a telephony provider connection and bridge it to the AI backend.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Telephony media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>) {
    let Leg { inbound, outbound } = Leg::from_axum(TELEPHONY_LEG, socket);
    let session = BridgeSession::new(outbound, state.session_context.clone());

    let _registration = state.sessions.register(session.state());
    session.run(inbound).await;
}
