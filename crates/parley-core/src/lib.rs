//! Parley core
//!
//! Shared event types, conversation turns and the publish/subscribe
//! [`EventBus`] that decouples the transport from backend processing.

pub mod bus;
pub mod event;
pub mod message;

pub use bus::{
    handler_fn, panic_message, Dispatch, DispatchReport, EventBus, EventHandler, FnHandler,
};
pub use event::{Event, EventName, EventPayload, UnknownEventName};
pub use message::{ChatMessage, Role};
