//! Parley Gateway - WebSocket transport for prompt sessions
//!
//! Accepts connections, validates client frames, hands valid messages to a
//! [`MessageHandler`] and writes backend responses back to the connection
//! that asked for them.

mod connection;
mod delivery;
mod gateway;
mod handler;
mod protocol;

pub use connection::{ConnectionError, ConnectionHandle, ConnectionPool};
pub use delivery::{Delivery, DeliveryRegistry, ResponseDelivery};
pub use gateway::{Gateway, GatewayConfig, GatewayError};
pub use handler::{InboundMessage, MessageHandler};
pub use protocol::{ClientMessage, FileAttachment, FrameType, ServerFrame, ValidationError};
