//! Process-wide registry of live bridge sessions.
//!
//! Backs `GET /sessions` and the concurrent-call limit. Entries are removed
//! by the [`RegistrationGuard`] when the owning connection task ends.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::bridge::{SessionSnapshot, SessionState};

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<SessionState>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `state` until the returned guard is dropped.
    pub fn register(&self, state: Arc<SessionState>) -> RegistrationGuard {
        let session_id = state.session_id();
        self.sessions.insert(session_id, state);
        tracing::debug!(%session_id, active = self.sessions.len(), "Session registered");

        RegistrationGuard {
            sessions: self.sessions.clone(),
            session_id,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshots of every live session, oldest first.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| {
            a.started_at_ms
                .cmp(&b.started_at_ms)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        snapshots
    }
}

/// Removes its session from the registry on drop.
#[derive(Debug)]
pub struct RegistrationGuard {
    sessions: Arc<DashMap<Uuid, Arc<SessionState>>>,
    session_id: Uuid,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.session_id);
        tracing::debug!(
            session_id = %self.session_id,
            active = self.sessions.len(),
            "Session unregistered"
        );
    }
}
