//! Built-in event subscribers
//!
//! Observers that log session, message, audio and server events. Audio is
//! the hand-off point for a transcription collaborator; none is wired in.

pub mod audio;
pub mod lifecycle;

pub use audio::AudioHandler;
pub use lifecycle::LifecycleHandler;

use parley_core::{EventBus, EventName};
use std::sync::Arc;

/// Subscribe the built-in observers on `bus`
pub fn register_default_handlers(bus: &EventBus) {
    let lifecycle = Arc::new(LifecycleHandler);
    for name in LifecycleHandler::EVENTS {
        bus.subscribe(name, lifecycle.clone());
    }
    bus.subscribe(EventName::AudioReceived, Arc::new(AudioHandler));
}
