use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub router: RouterConfig,
    pub llm: LlmConfig,
    pub install: InstallConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            router: RouterConfig::default(),
            llm: LlmConfig::default(),
            install: InstallConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// `host:port` the gateway binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}

/// WebSocket listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted frame or message, in bytes
    pub max_frame_size: usize,
    /// Live connections beyond this are turned away
    pub max_connections: usize,
    /// Seconds a client gets to finish the WebSocket handshake
    pub handshake_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_frame_size: 1024 * 1024,
            max_connections: 100,
            handshake_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Messages kept per session before the oldest is evicted
    pub history_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { history_cap: 100 }
    }
}

/// Request handling behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    pub send_ack: bool,
    pub ack_message: String,
    /// Turn away a second request while one is in flight on the same session
    pub reject_concurrent: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            send_ack: true,
            ack_message: "Prompt received and being processed".to_string(),
            reject_concurrent: true,
        }
    }
}

/// Backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    /// Canned replies, no model server needed
    Echo,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::Echo => f.write_str("echo"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "echo" => Ok(Self::Echo),
            _ => Err(ConfigError::Validation(format!("Unknown provider: {}", s))),
        }
    }
}

/// LLM backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "codellama".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Startup environment check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallConfig {
    pub check_on_startup: bool,
    pub auto_install: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            check_on_startup: true,
            auto_install: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Also write logs to this file (`~` is expanded)
    pub file: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
