//! Parley Server - command-line entry point and wiring
//!
//! Loads configuration, sets up logging, checks the backend environment and
//! runs the WebSocket gateway until interrupted.

pub mod app;
pub mod environment;
pub mod logging;

pub use app::App;
pub use environment::{gate, Environment, GateOutcome, OllamaEnvironment};
pub use logging::init_logging;
