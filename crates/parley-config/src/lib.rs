pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, GatewayConfig, InstallConfig, LlmConfig, LogLevel,
    LoggingConfig, ProviderKind, RouterConfig, SessionConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
