//! Error taxonomy for bridge sessions.
//!
//! Errors fall into three classes with different propagation rules:
//!
//! - [`BridgeError::Setup`]: credential resolution or the AI-leg dial failed.
//!   Fatal to the session; the telephony leg is closed and nothing is retried.
//! - [`BridgeError::Transport`]: a leg's socket errored or reset. Fatal; the
//!   peer leg is torn down.
//! - [`BridgeError::Protocol`]: a single frame could not be parsed. Recovered
//!   locally by dropping the frame.

use thiserror::Error;

use crate::core::convai::CredentialError;

/// A single frame that could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match the expected shape
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Frame parsed but carried an invalid field value
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}

/// Errors raised while running a bridge session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Session setup failed before the AI leg became usable
    #[error("Session setup failed: {0}")]
    Setup(String),

    /// A leg's underlying socket failed
    #[error("Transport error on {leg} leg: {message}")]
    Transport { leg: &'static str, message: String },

    /// A single frame was rejected
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    pub fn transport(leg: &'static str, err: impl std::fmt::Display) -> Self {
        BridgeError::Transport {
            leg,
            message: err.to_string(),
        }
    }

    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::Protocol(_))
    }
}

impl From<CredentialError> for BridgeError {
    fn from(err: CredentialError) -> Self {
        BridgeError::Setup(err.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
