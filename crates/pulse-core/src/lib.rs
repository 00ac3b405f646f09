//! # pulse-core
//!
//! Core crate for the market-feed system, providing:
//!
//! - **Types** (`types`): categories, connection/network states, instruments, snapshots
//! - **Configuration** (`config`): JSON config deserialization with defaults
//! - **Error types** (`error`): domain-specific `PulseError` via thiserror
//! - **WebSocket** (`ws`): price-stream transport with bounded linear reconnect
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
