//! Core domain types for the facegate access controller.
//!
//! This crate holds the vocabulary shared by every other facegate crate:
//! face embeddings and enrolled identities, camera frames and per-frame
//! observations, and the lock state and actuator commands.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
