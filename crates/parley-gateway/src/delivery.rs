//! Response delivery
//!
//! The gateway keeps a table from session id to the live connection that
//! serves it. Delivery consults the table when a `response_generated` event
//! arrives; if the connection is gone the response is dropped.

use async_trait::async_trait;
use dashmap::DashMap;
use parley_core::{Event, EventBus, EventHandler, EventName, EventPayload};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::protocol::ServerFrame;

/// Session id → live connection lookup table
#[derive(Debug, Clone, Default)]
pub struct DeliveryRegistry {
    routes: Arc<DashMap<String, ConnectionHandle>>,
}

/// Outcome of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No connection registered for the session
    NoConnection,
    /// A connection was registered but its task has already gone away
    Closed,
}

impl DeliveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: impl Into<String>, connection: ConnectionHandle) {
        self.routes.insert(session_id.into(), connection);
    }

    pub fn unregister(&self, session_id: &str) -> Option<ConnectionHandle> {
        self.routes.remove(session_id).map(|(_, conn)| conn)
    }

    pub fn lookup(&self, session_id: &str) -> Option<ConnectionHandle> {
        self.routes.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.routes.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Send `frame` to whatever connection currently serves `session_id`
    pub fn deliver(&self, session_id: &str, frame: ServerFrame) -> Delivery {
        let Some(connection) = self.lookup(session_id) else {
            return Delivery::NoConnection;
        };
        match connection.send(frame) {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Closed,
        }
    }
}

/// Writes `response_generated` results back to the originating connection
pub struct ResponseDelivery {
    registry: DeliveryRegistry,
}

impl ResponseDelivery {
    pub fn new(registry: DeliveryRegistry) -> Self {
        Self { registry }
    }

    /// Subscribe a delivery handler for `response_generated` on `bus`
    pub fn subscribe(bus: &EventBus, registry: DeliveryRegistry) {
        bus.subscribe(EventName::ResponseGenerated, Arc::new(Self::new(registry)));
    }
}

#[async_trait]
impl EventHandler for ResponseDelivery {
    fn name(&self) -> &str {
        "response_delivery"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let EventPayload::Message {
            session_id,
            message,
        } = event.payload()
        else {
            warn!(event = %event.name(), "Unexpected payload for response delivery");
            return Ok(());
        };

        match self
            .registry
            .deliver(session_id, ServerFrame::response(message.clone(), session_id.clone()))
        {
            Delivery::Sent => debug!(session_id = %session_id, "Response delivered"),
            Delivery::NoConnection | Delivery::Closed => {
                debug!(session_id = %session_id, "No live connection, dropping response")
            }
        }
        Ok(())
    }
}
