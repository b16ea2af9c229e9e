//! Conversational-AI WebSocket message types.
//!
//! All frames are JSON text. Client frames are sent by the bridge, server
//! frames are received from the agent backend.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - conversation_initiation_client_data - Per-call variables and overrides, sent once
//! - {user_audio_chunk} - Base64 caller audio (untyped frame)
//! - pong - Keepalive reply echoing the ping's event id
//!
//! Server events (received from server):
//! - conversation_initiation_metadata - Conversation id and audio formats
//! - audio - Agent audio, in either `audio.chunk` or `audio_event.audio_base_64`
//! - interruption - Agent speech was cut off by the caller
//! - ping - Keepalive, must be answered with a pong
//! - agent_response - Agent text
//! - user_transcript - Caller speech transcript

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

// =============================================================================
// Client Events
// =============================================================================

/// Typed frames sent to the agent backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Per-call configuration, sent once before any audio
    ConversationInitiationClientData(ConversationInitiation),

    /// Keepalive reply
    Pong {
        /// Event id copied from the ping
        event_id: EventId,
    },
}

/// Caller audio frame. This frame carries no `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAudioChunk {
    /// Base64 encoded audio
    pub user_audio_chunk: String,
}

impl UserAudioChunk {
    pub fn new(audio_base64: impl Into<String>) -> Self {
        Self {
            user_audio_chunk: audio_base64.into(),
        }
    }
}

/// Body of `conversation_initiation_client_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationInitiation {
    /// Values substituted into `{{placeholders}}` in the agent prompt
    pub dynamic_variables: BTreeMap<String, String>,

    /// Per-call agent overrides
    pub conversation_config_override: ConversationConfigOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentOverride {
    pub prompt: PromptOverride,
    pub first_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptOverride {
    pub prompt: String,
}

/// Keepalive event id, kept as raw JSON so the pong echoes it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Value);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        EventId(Value::String(value.to_string()))
    }
}

impl From<i64> for EventId {
    fn from(value: i64) -> Self {
        EventId(Value::from(value))
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Agent audio in whichever shape the backend used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioChunk {
    /// `{"type":"audio","audio":{"chunk":"..."}}`
    Chunk(String),
    /// `{"type":"audio","audio_event":{"audio_base_64":"...","event_id":1}}`
    AudioEvent {
        audio_base_64: String,
        event_id: Option<EventId>,
    },
}

impl AudioChunk {
    /// Base64 audio, regardless of shape.
    pub fn into_payload(self) -> String {
        match self {
            AudioChunk::Chunk(payload) => payload,
            AudioChunk::AudioEvent { audio_base_64, .. } => audio_base_64,
        }
    }
}

/// Frames received from the agent backend, after shape resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Conversation accepted by the backend
    ConversationMetadata {
        conversation_id: String,
        agent_output_audio_format: Option<String>,
    },
    /// Agent audio for the caller
    Audio(AudioChunk),
    /// Caller interrupted the agent
    Interruption,
    /// Keepalive that needs a pong
    Ping { event_id: EventId },
    /// Agent text response
    AgentResponse { text: String },
    /// Caller transcript
    UserTranscript { text: String },
    /// Any other event type
    Unknown,
}

impl ServerEvent {
    /// Parse a text frame from the agent backend.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireEvent = serde_json::from_str(text)?;
        wire.resolve()
    }

    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ConversationMetadata { .. } => "conversation_initiation_metadata",
            ServerEvent::Audio(_) => "audio",
            ServerEvent::Interruption => "interruption",
            ServerEvent::Ping { .. } => "ping",
            ServerEvent::AgentResponse { .. } => "agent_response",
            ServerEvent::UserTranscript { .. } => "user_transcript",
            ServerEvent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: WireInitiationMetadata,
    },
    Audio(WireAudio),
    Interruption,
    Ping(WirePing),
    AgentResponse {
        agent_response_event: WireAgentResponse,
    },
    UserTranscript {
        user_transcription_event: WireUserTranscript,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireInitiationMetadata {
    conversation_id: String,
    #[serde(default)]
    agent_output_audio_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAudio {
    #[serde(default)]
    audio: Option<WireAudioChunk>,
    #[serde(default)]
    audio_event: Option<WireAudioEvent>,
}

#[derive(Debug, Deserialize)]
struct WireAudioChunk {
    chunk: String,
}

#[derive(Debug, Deserialize)]
struct WireAudioEvent {
    audio_base_64: String,
    #[serde(default)]
    event_id: Option<EventId>,
}

#[derive(Debug, Deserialize)]
struct WirePing {
    #[serde(default)]
    ping_event: Option<WirePingEvent>,
    #[serde(default)]
    event_id: Option<EventId>,
}

#[derive(Debug, Deserialize)]
struct WirePingEvent {
    event_id: EventId,
}

#[derive(Debug, Deserialize)]
struct WireAgentResponse {
    agent_response: String,
}

#[derive(Debug, Deserialize)]
struct WireUserTranscript {
    user_transcript: String,
}

impl WireEvent {
    fn resolve(self) -> Result<ServerEvent, ProtocolError> {
        Ok(match self {
            WireEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => ServerEvent::ConversationMetadata {
                conversation_id: meta.conversation_id,
                agent_output_audio_format: meta.agent_output_audio_format,
            },
            // audio_event is the current shape; audio.chunk is the legacy one
            WireEvent::Audio(audio) => match (audio.audio_event, audio.audio) {
                (Some(event), _) => ServerEvent::Audio(AudioChunk::AudioEvent {
                    audio_base_64: event.audio_base_64,
                    event_id: event.event_id,
                }),
                (None, Some(chunk)) => ServerEvent::Audio(AudioChunk::Chunk(chunk.chunk)),
                (None, None) => {
                    return Err(ProtocolError::InvalidField {
                        field: "audio",
                        reason: "neither `audio.chunk` nor `audio_event.audio_base_64` present"
                            .to_string(),
                    });
                }
            },
            WireEvent::Interruption => ServerEvent::Interruption,
            WireEvent::Ping(ping) => {
                let event_id = ping
                    .ping_event
                    .map(|p| p.event_id)
                    .or(ping.event_id)
                    .ok_or_else(|| ProtocolError::InvalidField {
                        field: "ping_event.event_id",
                        reason: "missing".to_string(),
                    })?;
                ServerEvent::Ping { event_id }
            }
            WireEvent::AgentResponse {
                agent_response_event,
            } => ServerEvent::AgentResponse {
                text: agent_response_event.agent_response,
            },
            WireEvent::UserTranscript {
                user_transcription_event,
            } => ServerEvent::UserTranscript {
                text: user_transcription_event.user_transcript,
            },
            WireEvent::Unknown => ServerEvent::Unknown,
        })
    }
}
