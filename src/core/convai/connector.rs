//! AI-leg dialling.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::core::bridge::Leg;
use crate::errors::{BridgeError, BridgeResult};

/// Leg name used in logs and transport errors.
pub const AI_LEG: &str = "ai";

/// Default bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the AI leg from a signed URL.
#[async_trait]
pub trait AiLegConnector: Send + Sync {
    async fn connect(&self, signed_url: &str) -> BridgeResult<Leg>;
}

/// Dials the agent backend with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl AiLegConnector for WebSocketConnector {
    async fn connect(&self, signed_url: &str) -> BridgeResult<Leg> {
        let host = Url::parse(signed_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let connect = tokio_tungstenite::connect_async(signed_url);
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                BridgeError::Setup(format!(
                    "AI leg handshake timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| BridgeError::Setup(format!("AI leg handshake failed: {e}")))?;

        tracing::info!(host = %host, "Connected to conversational AI backend");

        Ok(Leg::from_tungstenite(AI_LEG, ws_stream))
    }
}
