//! Session registry
//!
//! Creation, lookup, history and lifecycle of live sessions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_core::ChatMessage;
use std::sync::Arc;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::types::{Session, SessionId};

/// Retained messages per session when nothing else is configured
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Manages all active sessions.
///
/// Cloning is cheap and every clone sees the same sessions. Each operation
/// holds the shard lock of its session for its whole duration.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Session>>,
    history_cap: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl SessionRegistry {
    /// Create a registry keeping at most `history_cap` messages per session.
    /// A cap of zero is raised to one.
    pub fn new(history_cap: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            history_cap: history_cap.max(1),
        }
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Create a new, empty session
    pub fn create(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            // Never overwrite a live id
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(Session::new(id.clone()));
                debug!(session_id = %id, "Session created");
                return id;
            }
        }
    }

    /// Snapshot of a session, if it exists
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn exists(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Append a turn to the session history, evicting the oldest entry once
    /// the cap is exceeded
    pub fn append_message(&self, id: &SessionId, message: ChatMessage) -> SessionResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id.as_str()))?;
        session.push_message(message, self.history_cap);
        Ok(())
    }

    /// Copy of the session history, oldest first
    pub fn history(&self, id: &SessionId) -> SessionResult<Vec<ChatMessage>> {
        self.sessions
            .get(id)
            .map(|session| session.history().cloned().collect())
            .ok_or_else(|| SessionError::not_found(id.as_str()))
    }

    /// Record which connection currently serves the session
    pub fn bind_connection(
        &self,
        id: &SessionId,
        connection_id: impl Into<String>,
    ) -> SessionResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id.as_str()))?;
        session.set_connection(Some(connection_id.into()));
        Ok(())
    }

    /// Mark a backend request as in flight.
    ///
    /// Fails with [`SessionError::Busy`] if one is already outstanding.
    pub fn begin_request(&self, id: &SessionId) -> SessionResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id.as_str()))?;
        if session.is_busy() {
            return Err(SessionError::Busy(
                "a request is already in progress".to_string(),
            ));
        }
        session.set_in_flight(true);
        Ok(())
    }

    /// Clear the in-flight mark set by [`Self::begin_request`]
    pub fn finish_request(&self, id: &SessionId) -> SessionResult<()> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id.as_str()))?;
        session.set_in_flight(false);
        Ok(())
    }

    /// Remove a session and release its connection reference
    pub fn close(&self, id: &SessionId) -> SessionResult<Session> {
        let (_, mut session) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::not_found(id.as_str()))?;
        session.set_connection(None);
        debug!(
            session_id = %id,
            history_len = session.history_len(),
            "Session closed"
        );
        Ok(session)
    }

    /// Get total session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of all live sessions
    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
