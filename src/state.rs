use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::bridge::SessionContext;
use crate::core::convai::{CredentialError, ElevenLabsResolver, WebSocketConnector};
use crate::core::registry::SessionRegistry;

/// Application state shared by every handler
pub struct AppState {
    pub config: ServerConfig,
    /// Live bridge sessions
    pub sessions: SessionRegistry,
    /// Collaborators handed to each new session
    pub session_context: Arc<SessionContext>,
}

impl AppState {
    /// Build the state with the ElevenLabs resolver and WebSocket connector.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, CredentialError> {
        let resolver = ElevenLabsResolver::new(
            &config.elevenlabs_api_url,
            config.elevenlabs_api_key.clone(),
            config.signed_url_timeout(),
        )?;

        let context = SessionContext::new(
            Arc::new(resolver),
            Arc::new(WebSocketConnector::default()),
            config.session_defaults(),
            config.elevenlabs_agent_id.clone(),
        );

        Ok(Self::with_context(config, context))
    }

    /// Build the state around an existing session context.
    pub fn with_context(config: ServerConfig, context: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: SessionRegistry::new(),
            session_context: Arc::new(context),
        })
    }

    /// Whether the concurrent-call limit has been reached.
    pub fn at_capacity(&self) -> bool {
        self.config
            .max_concurrent_calls
            .is_some_and(|max| self.sessions.len() >= max)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            tls: None,
            elevenlabs_api_key: "test-key".to_string(),
            elevenlabs_api_url: "http://127.0.0.1:9".to_string(),
            elevenlabs_agent_id: Some("agent_test".to_string()),
            signed_url_timeout_seconds: 1,
            default_caller_name: "there".to_string(),
            default_first_message: "Hello".to_string(),
            default_prompt: "Be brief.".to_string(),
            max_concurrent_calls: None,
        }
    }

    pub fn test_state(max_concurrent_calls: Option<usize>) -> Arc<AppState> {
        let mut config = test_config();
        config.max_concurrent_calls = max_concurrent_calls;
        AppState::new(config).unwrap()
    }
}
