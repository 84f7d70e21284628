use async_trait::async_trait;
use parley_core::ChatMessage;
use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

use crate::error::{LLMError, Result};

/// A text-generation backend
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider ID
    fn provider_id(&self) -> &str;

    /// Produce a reply for `history`, oldest turn first.
    ///
    /// May take seconds; callers run it off the connection task.
    async fn generate(&self, history: &[ChatMessage]) -> Result<String>;

    /// Check that the backend is reachable and ready to serve requests
    async fn validate(&self) -> Result<()>;
}

/// Connection settings shared by HTTP providers
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl HttpSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// HTTP client retrying transient failures with exponential backoff
    pub fn build_client(&self) -> Result<ClientWithMiddleware> {
        let retry_policy = ExponentialBackoff::builder()
            .base(2)
            .build_with_max_retries(self.max_retries);

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LLMError::Config(e.to_string()))?;

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build())
    }
}
