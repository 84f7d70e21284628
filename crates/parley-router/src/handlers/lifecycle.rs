use async_trait::async_trait;
use parley_core::{Event, EventHandler, EventName, EventPayload};
use std::sync::Arc;
use tracing::{debug, info};

/// Logs session, message and server lifecycle events
pub struct LifecycleHandler;

impl LifecycleHandler {
    pub const EVENTS: [EventName; 5] = [
        EventName::SessionCreated,
        EventName::SessionClosed,
        EventName::MessageReceived,
        EventName::ServerStarted,
        EventName::ServerStopped,
    ];
}

#[async_trait]
impl EventHandler for LifecycleHandler {
    fn name(&self) -> &str {
        "lifecycle"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        match (event.name(), event.payload()) {
            (EventName::ServerStarted, EventPayload::Server { addr }) => {
                info!("Server is running on {}. Press Ctrl+C to stop.", addr)
            }
            (EventName::ServerStopped, EventPayload::Server { addr }) => {
                info!("Server on {} stopped", addr)
            }
            (EventName::MessageReceived, EventPayload::Message { session_id, message }) => {
                debug!(session_id = %session_id, chars = message.len(), "Prompt accepted")
            }
            (name, payload) => debug!(
                event = %name,
                session_id = payload.session_id().unwrap_or_default(),
                at = %event.timestamp(),
                "Session event"
            ),
        }
        Ok(())
    }
}
