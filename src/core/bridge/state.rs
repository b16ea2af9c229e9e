//! Shared per-session state.
//!
//! Both receive loops of a session read and update this holder. All fields
//! live behind one `parking_lot::RwLock`, so each transition is applied
//! atomically and the guards never cross an await point.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Telephony leg accepted, waiting for `start`
    Initializing,
    /// `start` received, resolving credentials and dialling the AI leg
    AwaitingAiConnection,
    /// Both legs open and relaying
    Active,
    /// Teardown in progress
    Closing,
    /// Both legs closed
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Initializing => write!(f, "initializing"),
            SessionPhase::AwaitingAiConnection => write!(f, "awaiting_ai_connection"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Closing => write!(f, "closing"),
            SessionPhase::Closed => write!(f, "closed"),
        }
    }
}

/// State of the AI-session leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiLegState {
    Unconnected,
    Connecting,
    Open,
    Closed,
}

/// State of the telephony leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelephonyLegState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct StateInner {
    phase: SessionPhase,
    ai_leg: AiLegState,
    telephony_leg: TelephonyLegState,
    call_id: Option<String>,
    stream_id: Option<String>,
    conversation_id: Option<String>,
}

/// Point-in-time view of a session, as reported by `GET /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub ai_leg: AiLegState,
    pub telephony_leg: TelephonyLegState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Milliseconds since the Unix epoch
    pub started_at_ms: u64,
}

/// Synchronized state holder for one bridge session.
#[derive(Debug)]
pub struct SessionState {
    session_id: Uuid,
    started_at_ms: u64,
    inner: RwLock<StateInner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let started_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            session_id: Uuid::new_v4(),
            started_at_ms,
            inner: RwLock::new(StateInner {
                phase: SessionPhase::Initializing,
                ai_leg: AiLegState::Unconnected,
                telephony_leg: TelephonyLegState::Open,
                call_id: None,
                stream_id: None,
                conversation_id: None,
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().phase
    }

    pub fn ai_leg(&self) -> AiLegState {
        self.inner.read().ai_leg
    }

    pub fn telephony_leg(&self) -> TelephonyLegState {
        self.inner.read().telephony_leg
    }

    pub fn stream_id(&self) -> Option<String> {
        self.inner.read().stream_id.clone()
    }

    pub fn call_id(&self) -> Option<String> {
        self.inner.read().call_id.clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.read().conversation_id.clone()
    }

    /// Record the stream identity from the first `start` event.
    ///
    /// Moves `Initializing -> AwaitingAiConnection` and marks the AI leg as
    /// connecting. Returns `false` (and changes nothing) in any other phase.
    pub fn capture_start(&self, stream_id: &str, call_id: Option<&str>) -> bool {
        let mut inner = self.inner.write();
        if inner.phase != SessionPhase::Initializing {
            return false;
        }
        inner.stream_id = Some(stream_id.to_string());
        inner.call_id = call_id.map(str::to_string);
        inner.phase = SessionPhase::AwaitingAiConnection;
        inner.ai_leg = AiLegState::Connecting;
        true
    }

    /// Mark the AI leg open and the session active.
    ///
    /// Fails if the session started closing while the leg was being dialled.
    pub fn mark_ai_open(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.phase != SessionPhase::AwaitingAiConnection || inner.ai_leg != AiLegState::Connecting
        {
            return false;
        }
        inner.ai_leg = AiLegState::Open;
        inner.phase = SessionPhase::Active;
        true
    }

    /// Mark the AI leg closed. A leg that was never dialled stays `Unconnected`.
    pub fn mark_ai_closed(&self) {
        let mut inner = self.inner.write();
        if inner.ai_leg != AiLegState::Unconnected {
            inner.ai_leg = AiLegState::Closed;
        }
    }

    /// Mark the telephony leg closed. Returns whether it was open.
    pub fn mark_telephony_closed(&self) -> bool {
        let mut inner = self.inner.write();
        let was_open = inner.telephony_leg == TelephonyLegState::Open;
        inner.telephony_leg = TelephonyLegState::Closed;
        was_open
    }

    /// Enter `Closing` unless already `Closed`.
    pub fn begin_closing(&self) {
        let mut inner = self.inner.write();
        if inner.phase != SessionPhase::Closed {
            inner.phase = SessionPhase::Closing;
        }
    }

    /// Terminal transition. Both legs are reported closed afterwards.
    pub fn mark_closed(&self) {
        let mut inner = self.inner.write();
        inner.phase = SessionPhase::Closed;
        inner.telephony_leg = TelephonyLegState::Closed;
        if inner.ai_leg != AiLegState::Unconnected {
            inner.ai_leg = AiLegState::Closed;
        }
    }

    pub fn set_conversation_id(&self, conversation_id: String) {
        self.inner.write().conversation_id = Some(conversation_id);
    }

    /// Stream id to address telephony-bound frames to, if forwarding is allowed.
    pub fn telephony_target(&self) -> Option<String> {
        let inner = self.inner.read();
        if inner.telephony_leg != TelephonyLegState::Open {
            return None;
        }
        inner.stream_id.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            session_id: self.session_id,
            phase: inner.phase,
            ai_leg: inner.ai_leg,
            telephony_leg: inner.telephony_leg,
            call_id: inner.call_id.clone(),
            stream_id: inner.stream_id.clone(),
            conversation_id: inner.conversation_id.clone(),
            started_at_ms: self.started_at_ms,
        }
    }
}
