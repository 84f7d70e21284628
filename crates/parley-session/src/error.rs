//! Session error types

use thiserror::Error;

/// Errors returned by [`crate::SessionRegistry`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The id was never created or has already been closed
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session already has a request in flight
    #[error("Session busy: {0}")]
    Busy(String),
}

impl SessionError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
