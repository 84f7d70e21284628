//! Event definitions
//!
//! Every event published on the bus carries a name from a fixed vocabulary, a
//! typed payload and the time it was published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of event names understood by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    /// A connection was accepted and a session created for it
    SessionCreated,
    /// A session was torn down after its connection closed
    SessionClosed,
    /// A validated, formatted prompt was accepted for a session
    MessageReceived,
    /// An opaque audio chunk arrived alongside a message
    AudioReceived,
    /// The backend finished (or failed) a request
    ResponseGenerated,
    /// The gateway started listening
    ServerStarted,
    /// The gateway stopped accepting connections and drained
    ServerStopped,
}

impl EventName {
    /// All event names, in declaration order.
    pub const ALL: [EventName; 7] = [
        EventName::SessionCreated,
        EventName::SessionClosed,
        EventName::MessageReceived,
        EventName::AudioReceived,
        EventName::ResponseGenerated,
        EventName::ServerStarted,
        EventName::ServerStopped,
    ];

    /// Wire/log name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SessionCreated => "session_created",
            EventName::SessionClosed => "session_closed",
            EventName::MessageReceived => "message_received",
            EventName::AudioReceived => "audio_received",
            EventName::ResponseGenerated => "response_generated",
            EventName::ServerStarted => "server_started",
            EventName::ServerStopped => "server_stopped",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a string that is not part of the vocabulary.
#[derive(Debug, thiserror::Error)]
#[error("Unknown event name: {0}")]
pub struct UnknownEventName(pub String);

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// Typed payloads carried by events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Session lifecycle
    Session { session_id: String },
    /// A text message tied to a session (prompts and backend replies)
    Message { session_id: String, message: String },
    /// An opaque audio payload tied to a session
    Audio {
        session_id: String,
        audio: serde_json::Value,
    },
    /// Server lifecycle
    Server { addr: String },
}

impl EventPayload {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session {
            session_id: session_id.into(),
        }
    }

    pub fn message(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Message {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    pub fn audio(session_id: impl Into<String>, audio: serde_json::Value) -> Self {
        Self::Audio {
            session_id: session_id.into(),
            audio,
        }
    }

    pub fn server(addr: impl Into<String>) -> Self {
        Self::Server { addr: addr.into() }
    }

    /// The session this payload refers to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            EventPayload::Session { session_id }
            | EventPayload::Message { session_id, .. }
            | EventPayload::Audio { session_id, .. } => Some(session_id),
            EventPayload::Server { .. } => None,
        }
    }
}

/// An immutable published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: EventName,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(name: EventName, payload: EventPayload) -> Self {
        Self {
            name,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> EventName {
        self.name
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn session_id(&self) -> Option<&str> {
        self.payload.session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_round_trips_through_str() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
        }
        assert!("not_an_event".parse::<EventName>().is_err());
    }

    #[test]
    fn test_event_name_serializes_snake_case() {
        let json = serde_json::to_string(&EventName::ResponseGenerated).unwrap();
        assert_eq!(json, "\"response_generated\"");
    }

    #[test]
    fn test_payload_session_id() {
        assert_eq!(EventPayload::session("s1").session_id(), Some("s1"));
        assert_eq!(EventPayload::message("s2", "hi").session_id(), Some("s2"));
        assert_eq!(
            EventPayload::audio("s3", serde_json::json!([1, 2])).session_id(),
            Some("s3")
        );
        assert_eq!(EventPayload::server("127.0.0.1:1").session_id(), None);
    }

    #[test]
    fn test_event_is_timestamped() {
        let before = Utc::now();
        let event = Event::new(EventName::SessionCreated, EventPayload::session("abc"));
        assert!(event.timestamp() >= before);
        assert_eq!(event.name(), EventName::SessionCreated);
        assert_eq!(event.session_id(), Some("abc"));
    }
}
