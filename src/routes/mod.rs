use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub mod api;
pub mod media;

/// Build the complete application router
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(media::create_media_router(state.clone()))
        .with_state(state)
}
