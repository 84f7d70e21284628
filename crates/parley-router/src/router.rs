//! Message router
//!
//! Turns a validated client message into a backend request: formats the
//! prompt, records it in the session history, registers the connection for
//! delivery and runs the backend call on its own task. A successful reply is
//! recorded as an assistant turn. Every accepted request ends with exactly
//! one `response_generated` event.

use async_trait::async_trait;
use futures::FutureExt;
use parley_core::{panic_message, ChatMessage, EventBus, EventName, EventPayload};
use parley_gateway::{DeliveryRegistry, InboundMessage, MessageHandler, ServerFrame};
use parley_llm::LLMProvider;
use parley_session::{SessionError, SessionId, SessionRegistry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::prompt::format_prompt;

pub const BUSY_MESSAGE: &str = "Session busy: a request is already in progress";
pub const SESSION_NOT_FOUND_MESSAGE: &str = "Session not found";

/// Request handling options
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Send an `ack` frame once a request is accepted
    pub send_ack: bool,
    pub ack_message: String,
    /// Allow at most one backend request per session at a time
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

pub struct MessageRouter {
    config: RouterConfig,
    sessions: SessionRegistry,
    bus: EventBus,
    deliveries: DeliveryRegistry,
    provider: Arc<dyn LLMProvider>,
}

impl MessageRouter {
    pub fn new(
        config: RouterConfig,
        sessions: SessionRegistry,
        bus: EventBus,
        deliveries: DeliveryRegistry,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            config,
            sessions,
            bus,
            deliveries,
            provider,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Accept one message.
    ///
    /// Returns the backend task, or `None` if the request was turned away
    /// (busy or unknown session) with an `error` frame.
    pub fn route(&self, inbound: InboundMessage) -> Option<JoinHandle<()>> {
        let InboundMessage {
            session_id,
            connection,
            message,
        } = inbound;

        let prompt = format_prompt(&message.message, &message.files);

        if self.config.reject_concurrent {
            if let Err(e) = self.sessions.begin_request(&session_id) {
                let reply = match e {
                    SessionError::Busy(_) => BUSY_MESSAGE,
                    SessionError::NotFound(_) => SESSION_NOT_FOUND_MESSAGE,
                };
                warn!(session_id = %session_id, "Request rejected: {}", e);
                let _ = connection.send(ServerFrame::error(reply, session_id.as_str()));
                return None;
            }
        }

        let history = match self
            .sessions
            .append_message(&session_id, ChatMessage::user(prompt.clone()))
            .and_then(|_| self.sessions.history(&session_id))
        {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id = %session_id, "Cannot record message: {}", e);
                let _ = connection.send(ServerFrame::error(
                    SESSION_NOT_FOUND_MESSAGE,
                    session_id.as_str(),
                ));
                return None;
            }
        };

        self.deliveries.register(session_id.as_str(), connection.clone());
        self.bus.publish(
            EventName::MessageReceived,
            EventPayload::message(session_id.as_str(), prompt),
        );

        if self.config.send_ack {
            let _ = connection.send(ServerFrame::ack(
                self.config.ack_message.clone(),
                session_id.as_str(),
            ));
        }

        debug!(
            session_id = %session_id,
            history_len = history.len(),
            provider = self.provider.provider_id(),
            "Dispatching backend request"
        );

        Some(tokio::spawn(generate_response(
            session_id,
            history,
            Arc::clone(&self.provider),
            self.sessions.clone(),
            self.bus.clone(),
            self.config.reject_concurrent,
        )))
    }
}

/// Run the backend call and publish its outcome, success or not
async fn generate_response(
    session_id: SessionId,
    history: Vec<ChatMessage>,
    provider: Arc<dyn LLMProvider>,
    sessions: SessionRegistry,
    bus: EventBus,
    clear_busy: bool,
) {
    let outcome = AssertUnwindSafe(provider.generate(&history))
        .catch_unwind()
        .await;

    let message = match outcome {
        Ok(Ok(text)) => {
            info!(session_id = %session_id, chars = text.len(), "Response generated");
            let reply = ChatMessage::assistant(text.clone());
            if let Err(e) = sessions.append_message(&session_id, reply) {
                debug!(session_id = %session_id, "Reply not recorded: {}", e);
            }
            text
        }
        Ok(Err(e)) => {
            warn!(session_id = %session_id, "Backend error: {}", e);
            format!("Error generating response: {}", e)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            warn!(session_id = %session_id, "Backend panicked: {}", reason);
            format!("Error generating response: {}", reason)
        }
    };

    // The session may have closed while the backend was working
    if clear_busy {
        if let Err(e) = sessions.finish_request(&session_id) {
            debug!(session_id = %session_id, "{}", e);
        }
    }

    bus.publish(
        EventName::ResponseGenerated,
        EventPayload::message(session_id.as_str(), message),
    );
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn on_message(&self, inbound: InboundMessage) {
        self.route(inbound);
    }
}
