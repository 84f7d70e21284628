use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Loads, validates and persists the JSON configuration file
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load the config file, writing the defaults there first if it is missing
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = tokio::fs::read_to_string(path).await?;
            let content = Self::expand_env_vars(&content)?;
            serde_json::from_str(&content)?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Self::validate(&config)?;

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Owned copy of the current configuration
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Apply in-memory overrides (command-line flags) and re-validate.
    /// Nothing is written back to disk.
    pub async fn apply<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write().await;
        let mut updated = config.clone();
        f(&mut updated);
        Self::validate(&updated)?;
        *config = updated;
        Ok(())
    }

    pub async fn save(&self) -> ConfigResult<()> {
        let config = self.config.read().await;
        let content = serde_json::to_string_pretty(&*config)?;
        drop(config);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        if config.gateway.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Gateway host cannot be empty".to_string(),
            ));
        }

        if config.gateway.max_frame_size == 0 {
            return Err(ConfigError::Validation(
                "Gateway max_frame_size must be greater than 0".to_string(),
            ));
        }

        if config.gateway.max_connections == 0 {
            return Err(ConfigError::Validation(
                "Gateway max_connections must be greater than 0".to_string(),
            ));
        }

        if config.gateway.handshake_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Gateway handshake_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if config.session.history_cap == 0 {
            return Err(ConfigError::Validation(
                "Session history_cap must be greater than 0".to_string(),
            ));
        }

        if config.llm.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "LLM timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if config.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("LLM model cannot be empty".to_string()));
        }

        if config.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "LLM base_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid expansion pattern: {}", e)))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
