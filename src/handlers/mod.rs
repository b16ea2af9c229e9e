//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and session listing
//! - `media_stream` - Telephony media-stream WebSocket

pub mod api;
pub mod media_stream;

pub use api::{health_check, list_sessions};
pub use media_stream::media_stream_handler;
