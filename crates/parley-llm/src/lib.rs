//! Backend adapters for the parley gateway.
//!
//! A provider receives the full retained history of a session, oldest first,
//! and returns the reply text. Every failure is an [`LLMError`], which the
//! router turns into a user-visible response.

pub mod error;
pub mod provider;
pub mod providers;
pub mod transformer;

pub use error::{LLMError, Result};
pub use provider::{HttpSettings, LLMProvider};
pub use providers::{EchoProvider, OllamaProvider};
