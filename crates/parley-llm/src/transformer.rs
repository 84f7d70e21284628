//! Ollama wire format.
//!
//! Pure conversions between a session history and the JSON bodies of the
//! `/api/chat`, `/api/tags` and `/api/pull` endpoints.

use parley_core::ChatMessage;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LLMError, Result};

/// Body of `POST /api/chat`
#[derive(Debug, Serialize, PartialEq)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// The history goes out as-is, turns keeping their roles
pub fn chat_request<'a>(model: &'a str, history: &'a [ChatMessage]) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: history,
        stream: false,
    }
}

/// Extract `message.content` from a non-streaming chat reply
pub fn parse_chat_response(data: &Value) -> Result<String> {
    if let Some(error) = data.get("error").and_then(Value::as_str) {
        return Err(LLMError::InvalidResponse(error.to_string()));
    }

    data.get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LLMError::InvalidResponse("missing message.content".to_string()))
}

/// Model names listed by `GET /api/tags`
pub fn parse_model_list(data: &Value) -> Result<Vec<String>> {
    let models = data
        .get("models")
        .and_then(Value::as_array)
        .ok_or_else(|| LLMError::InvalidResponse("missing models".to_string()))?;

    Ok(models
        .iter()
        .filter_map(|model| model.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// `codellama` matches an installed `codellama:latest`
pub fn model_matches(installed: &str, wanted: &str) -> bool {
    if installed == wanted {
        return true;
    }
    match installed.split_once(':') {
        Some((name, tag)) => name == wanted && (tag == "latest" || !wanted.contains(':')),
        None => false,
    }
}

/// Best-effort message from an error body, falling back to the raw text
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
