//! WebSocket price-stream transport with bounded reconnect.

pub mod transport;

pub use transport::{
    NORMAL_CLOSURE, OnMessageCallback, StreamTransport, TransportConfig, retry_delay,
};
