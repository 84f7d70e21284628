//! Wire protocol
//!
//! Client frames are JSON objects with a required `message` string, an
//! optional `files` list and an optional opaque `audio` payload. Server
//! frames always carry `type`, `message` and `session_id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a client frame was rejected; the display text goes to the client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// A file attached to a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub filename: String,
    pub content: String,
}

/// A validated client frame
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub message: String,
    /// Well-formed attachments, in the order the client sent them
    pub files: Vec<FileAttachment>,
    pub audio: Option<Value>,
}

impl ClientMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            files: Vec::new(),
            audio: None,
        }
    }

    pub fn with_files(mut self, files: Vec<FileAttachment>) -> Self {
        self.files = files;
        self
    }

    /// Parse one text frame.
    ///
    /// Returns `Ok(None)` for an empty frame, which callers ignore. A `files`
    /// value that is not a list is ignored, as are entries without string
    /// `filename` and `content` fields.
    pub fn parse(text: &str) -> Result<Option<Self>, ValidationError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(text).map_err(|_| ValidationError::InvalidFormat)?;
        let object = match value {
            Value::Object(object) => object,
            _ => return Err(ValidationError::InvalidFormat),
        };

        let message = object
            .get("message")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingField("message"))?
            .to_string();

        Ok(Some(Self {
            message,
            files: parse_files(&object),
            audio: object.get("audio").filter(|audio| !audio.is_null()).cloned(),
        }))
    }
}

fn parse_files(object: &Map<String, Value>) -> Vec<FileAttachment> {
    let Some(Value::Array(entries)) = object.get("files") else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<FileAttachment>(entry.clone()).ok())
        .collect()
}

/// Server frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Ack,
    Error,
    Response,
}

/// A frame sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub message: String,
    pub session_id: String,
}

impl ServerFrame {
    pub fn ack(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(FrameType::Ack, message, session_id)
    }

    pub fn error(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(FrameType::Error, message, session_id)
    }

    pub fn response(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(FrameType::Response, message, session_id)
    }

    fn new(kind: FrameType, message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            session_id: session_id.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
