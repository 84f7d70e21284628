//! # Parley Session Registry
//!
//! Tracks the live sessions of the gateway and the bounded message history of
//! each one.
//!
//! - **Creation**: one session per accepted connection, keyed by an opaque,
//!   collision-free [`SessionId`]
//! - **History**: at most `history_cap` messages per session, oldest evicted
//!   first
//! - **Closing**: a closed id is gone for good; every later operation on it
//!   fails with [`SessionError::NotFound`]
//! - **Concurrency**: all operations are atomic per session id, so connection
//!   tasks and backend completions can share one registry

pub mod error;
pub mod registry;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use registry::{SessionRegistry, DEFAULT_HISTORY_CAP};
pub use types::{Session, SessionId};
