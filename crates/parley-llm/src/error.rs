use thiserror::Error;

/// Unified error type for backend operations
#[derive(Error, Debug)]
pub enum LLMError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for LLMError {
    fn from(e: serde_json::Error) -> Self {
        LLMError::InvalidResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
