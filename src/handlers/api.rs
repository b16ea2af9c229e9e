use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::core::bridge::SessionSnapshot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSnapshot>,
}

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "OK" })
}

/// List live bridge sessions, oldest first
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.sessions.snapshots();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}
