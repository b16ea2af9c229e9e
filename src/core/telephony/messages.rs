//! Telephony media-stream message types.
//!
//! Inbound events (provider -> bridge):
//! - connected - Socket handshake acknowledgement
//! - start - Stream metadata: streamSid, callSid, customParameters
//! - media - Base64 audio chunk
//! - stop - Stream ended
//! - mark / dtmf - Playback markers and keypad digits
//!
//! Outbound events (bridge -> provider):
//! - media - Audio to play to the caller, addressed by streamSid
//! - clear - Discard audio queued for playback on streamSid

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

// =============================================================================
// Inbound Events
// =============================================================================

/// Events received on the telephony leg.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Handshake frame sent before `start`
    Connected,

    /// Stream metadata, sent once per stream
    Start {
        /// Stream details
        start: StreamStart,
    },

    /// Inbound caller audio
    Media {
        /// Audio chunk
        media: MediaPayload,
    },

    /// Stream has ended
    Stop,

    /// Playback marker reached
    Mark,

    /// Keypad digit pressed
    Dtmf,

    /// Any event this bridge does not act on
    #[serde(other)]
    Unknown,
}

impl TelephonyEvent {
    /// Parse a text frame from the telephony leg.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let event: TelephonyEvent = serde_json::from_str(text)?;

        if let TelephonyEvent::Start { start } = &event
            && start.stream_sid.trim().is_empty()
        {
            return Err(ProtocolError::InvalidField {
                field: "start.streamSid",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(event)
    }

    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            TelephonyEvent::Connected => "connected",
            TelephonyEvent::Start { .. } => "start",
            TelephonyEvent::Media { .. } => "media",
            TelephonyEvent::Stop => "stop",
            TelephonyEvent::Mark => "mark",
            TelephonyEvent::Dtmf => "dtmf",
            TelephonyEvent::Unknown => "unknown",
        }
    }
}

/// Payload of the `start` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    /// Stream identifier the provider expects on every outbound frame
    pub stream_sid: String,

    /// Call identifier, used for log correlation only
    #[serde(default, alias = "callId")]
    pub call_sid: Option<String>,

    /// Free-form per-call parameters attached by the provider
    #[serde(default)]
    pub custom_parameters: HashMap<String, serde_json::Value>,
}

/// Payload of the `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 encoded audio
    pub payload: String,

    /// Track name (inbound/outbound)
    #[serde(default)]
    pub track: Option<String>,
}

// =============================================================================
// Outbound Events
// =============================================================================

/// Events sent to the telephony leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    /// Audio for playback to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Drop any audio already queued for playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Audio body of an outbound `media` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    /// Base64 encoded audio
    pub payload: String,
}

impl TelephonyOutbound {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyOutbound::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}
