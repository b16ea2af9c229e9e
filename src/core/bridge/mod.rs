//! Per-call bridge between the telephony leg and the AI leg.

pub mod leg;
pub mod session;
pub mod state;
pub mod variables;

pub use leg::{InboundFrame, InboundStream, LEG_CHANNEL_CAPACITY, Leg, LegSender, OutboundFrame};
pub use session::{BridgeSession, SessionContext};
pub use state::{AiLegState, SessionPhase, SessionSnapshot, SessionState, TelephonyLegState};
pub use variables::{SessionDefaults, SessionVariables};
