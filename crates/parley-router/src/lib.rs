//! Parley Router - from validated message to backend response
//!
//! [`MessageRouter`] implements the gateway's [`parley_gateway::MessageHandler`]:
//! it formats prompts, keeps session history, calls the backend off the
//! connection task and publishes `response_generated` when done.

pub mod handlers;
pub mod prompt;
pub mod router;

pub use handlers::register_default_handlers;
pub use prompt::{format_prompt, language_for};
pub use router::{MessageRouter, RouterConfig, BUSY_MESSAGE};
