//! Typed error definitions for the market-feed system.
//!
//! Provides [`PulseError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the market-feed system.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Stream message or catalog response parsing error.
    #[error("parse error: {0}")]
    Parse(String),
}
