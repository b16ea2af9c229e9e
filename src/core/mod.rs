pub mod bridge;
pub mod convai;
pub mod registry;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{
    BridgeSession, Leg, LegSender, SessionContext, SessionDefaults, SessionPhase, SessionSnapshot,
    SessionState,
};
pub use convai::{
    AiLegConnector, CredentialError, ElevenLabsResolver, SignedUrlResolver, WebSocketConnector,
};
pub use registry::{RegistrationGuard, SessionRegistry};
