//! Hand-off point between the gateway and whatever processes messages

use async_trait::async_trait;
use parley_session::SessionId;

use crate::connection::ConnectionHandle;
use crate::protocol::ClientMessage;

/// A validated message together with where it came from
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub session_id: SessionId,
    pub connection: ConnectionHandle,
    pub message: ClientMessage,
}

/// Receives every validated message, in receipt order per connection.
///
/// Called from the connection task, so implementations must hand slow work
/// off to another task.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, inbound: InboundMessage);
}
