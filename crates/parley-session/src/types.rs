//! Session state

use chrono::{DateTime, Utc};
use parley_core::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-side state for one client connection.
///
/// Values handed out by the registry are snapshots; mutation goes through
/// [`crate::SessionRegistry`].
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_activity: DateTime<Utc>,
    history: VecDeque<ChatMessage>,
    /// Lookup key of the live connection; never an owning handle
    connection_id: Option<String>,
    in_flight: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            history: VecDeque::new(),
            connection_id: None,
            in_flight: false,
        }
    }

    /// Append a turn, evicting the oldest entries beyond `cap`
    pub(crate) fn push_message(&mut self, message: ChatMessage, cap: usize) {
        self.history.push_back(message);
        while self.history.len() > cap {
            self.history.pop_front();
        }
        self.touch();
    }

    pub(crate) fn set_connection(&mut self, connection_id: Option<String>) {
        self.connection_id = connection_id;
        self.touch();
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Conversation so far, oldest first
    pub fn history(&self) -> impl ExactSizeIterator<Item = &ChatMessage> + '_ {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Check if session is currently bound to a connection
    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some()
    }

    /// Whether a backend request is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }
}
