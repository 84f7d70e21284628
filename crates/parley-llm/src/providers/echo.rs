use async_trait::async_trait;
use parley_core::{ChatMessage, Role};

use crate::error::Result;
use crate::provider::LLMProvider;

/// Replies without a model server; useful for local runs and smoke tests
#[derive(Debug, Default, Clone)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LLMProvider for EchoProvider {
    fn provider_id(&self) -> &str {
        "echo"
    }

    async fn generate(&self, history: &[ChatMessage]) -> Result<String> {
        let last = history
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        Ok(format!("Test response to: {}", last))
    }

    async fn validate(&self) -> Result<()> {
        Ok(())
    }
}
