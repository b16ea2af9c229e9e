//! Telephony media-stream protocol.
//!
//! The telephony provider streams call audio over a WebSocket as JSON text
//! frames discriminated by an `event` field. The bridge consumes `start`,
//! `media` and `stop`, and emits `media` and `clear` back to the provider.

pub mod messages;

/// Leg name used in logs and transport errors.
pub const TELEPHONY_LEG: &str = "telephony";

pub use messages::{MediaPayload, OutboundMedia, StreamStart, TelephonyEvent, TelephonyOutbound};
