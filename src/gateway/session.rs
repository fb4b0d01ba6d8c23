//! Session identity and sequence tracking.
//!
//! [`SessionInfo`] is mutated only from the inbound-frame-handling path;
//! the heartbeat task reads the last sequence through [`SharedSession`].

use std::sync::{Arc, Mutex, PoisonError};

/// Session identity retained across reconnect attempts.
///
/// `last_sequence` is the maximum sequence number seen so far; it never
/// decreases, even if a later frame carries a smaller number. Both fields
/// are cleared together when the session becomes non-resumable or the
/// caller explicitly disconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Server-issued session identifier, captured from the readiness event.
    pub session_id: Option<String>,
    /// Maximum sequence number observed on this session.
    pub last_sequence: Option<u64>,
}

impl SessionInfo {
    /// Records a sequence number, keeping the maximum seen so far.
    pub fn observe_sequence(&mut self, sequence: u64) {
        self.last_sequence = Some(self.last_sequence.map_or(sequence, |s| s.max(sequence)));
    }

    /// Clears both fields, making the session non-resumable.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.last_sequence = None;
    }
}

/// Cloneable handle to the session state shared between the inbound frame
/// handler (sole writer) and the heartbeat task (reader).
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionInfo>>,
}

impl SharedSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInfo> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a sequence number, keeping the maximum seen so far.
    pub fn observe_sequence(&self, sequence: u64) {
        self.lock().observe_sequence(sequence);
    }

    /// Stores the session identifier from the readiness event.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.lock().session_id = Some(session_id.into());
    }

    /// Clears the session entirely.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the maximum sequence number observed.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.lock().last_sequence
    }

    /// Returns `(session_id, last_sequence)` if the session is resumable.
    #[must_use]
    pub fn resume_params(&self) -> Option<(String, Option<u64>)> {
        let guard = self.lock();
        guard
            .session_id
            .clone()
            .map(|id| (id, guard.last_sequence))
    }

    /// Returns a copy of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionInfo {
        self.lock().clone()
    }
}
