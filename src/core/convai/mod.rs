//! Conversational-AI backend: credential resolution, dialling and wire types.

pub mod connector;
pub mod messages;
pub mod resolver;

pub use connector::{AI_LEG, AiLegConnector, DEFAULT_CONNECT_TIMEOUT, WebSocketConnector};
pub use messages::{
    AgentOverride, AudioChunk, ClientEvent, ConversationConfigOverride, ConversationInitiation,
    EventId, PromptOverride, ServerEvent, UserAudioChunk,
};
pub use resolver::{CredentialError, ElevenLabsResolver, SignedUrlResolver};
