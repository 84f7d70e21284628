use async_trait::async_trait;
use parley_core::ChatMessage;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{LLMError, Result};
use crate::provider::{HttpSettings, LLMProvider};
use crate::transformer;

/// Pulls can take far longer than a chat turn
const PULL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Chat completions from a local Ollama server
pub struct OllamaProvider {
    settings: HttpSettings,
    model: String,
    http_client: ClientWithMiddleware,
}

impl OllamaProvider {
    pub fn new(settings: HttpSettings, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(LLMError::Config("model name cannot be empty".to_string()));
        }
        let http_client = settings.build_client()?;
        Ok(Self {
            settings,
            model,
            http_client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// Names of the models installed on the server
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(self.settings.url("/api/tags"))
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;
        let data = Self::read_json(response).await?;
        transformer::parse_model_list(&data)
    }

    /// Whether the configured model is installed
    pub async fn has_model(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|installed| transformer::model_matches(installed, &self.model)))
    }

    /// Download the configured model; blocks until the pull finishes
    pub async fn pull_model(&self) -> Result<()> {
        info!(model = %self.model, "Pulling model");
        let response = self
            .http_client
            .post(self.settings.url("/api/pull"))
            .timeout(PULL_TIMEOUT)
            .json(&json!({ "model": self.model, "stream": false }))
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;
        let data = Self::read_json(response).await?;

        match data.get("status").and_then(Value::as_str) {
            Some("success") => {
                info!(model = %self.model, "Model pulled");
                Ok(())
            }
            _ => Err(LLMError::InvalidResponse(format!(
                "unexpected pull status: {}",
                data
            ))),
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::Api {
                status: status.as_u16(),
                message: transformer::error_message(&error_text),
            });
        }

        response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn provider_id(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String> {
        let body = transformer::chat_request(&self.model, history);
        debug!(
            model = %self.model,
            messages = history.len(),
            "Sending chat request"
        );

        let response = self
            .http_client
            .post(self.settings.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        let data = Self::read_json(response).await?;
        transformer::parse_chat_response(&data)
    }

    /// The server answers and the configured model is installed
    async fn validate(&self) -> Result<()> {
        if self.has_model().await? {
            Ok(())
        } else {
            Err(LLMError::Config(format!(
                "model '{}' is not installed",
                self.model
            )))
        }
    }
}
