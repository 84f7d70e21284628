use anyhow::bail;
use async_trait::async_trait;
use parley_core::{Event, EventHandler, EventPayload};
use std::sync::Arc;
use tracing::debug;

/// Receives audio chunks forwarded by the gateway
pub struct AudioHandler;

#[async_trait]
impl EventHandler for AudioHandler {
    fn name(&self) -> &str {
        "audio"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let EventPayload::Audio { session_id, audio } = event.payload() else {
            bail!("audio handler got a {} event", event.name());
        };
        debug!(
            session_id = %session_id,
            bytes = audio.to_string().len(),
            "Audio received"
        );
        Ok(())
    }
}
