//! # pulse-md
//!
//! Market-data pipeline on top of `pulse-core`.
//!
//! ## Architecture
//!
//! ```text
//! HttpCatalogFetcher ──► CatalogCache ─┐
//! StreamTransport ──► PriceFeed ───────┼──► MarketAggregator ──► projector
//! NetworkMonitor ──────────────────────┘
//! ```
//!
//! - [`catalog`]: HTTP catalog source and per-category TTL cache
//! - [`decoder`]: price stream message parsing
//! - [`feed`]: transport + decoder as a [`PriceSource`]
//! - [`combine`]: combine-latest fan-in over watch channels
//! - [`aggregator`]: merge rules, status priority, observer lifecycle
//! - [`projector`]: display-side filtering of a snapshot
//! - [`registry`]: builds the whole pipeline from config

pub mod aggregator;
pub mod catalog;
pub mod combine;
pub mod decoder;
pub mod feed;
pub mod json_util;
pub mod network;
pub mod projector;
pub mod registry;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use pulse_core::{ConnectionState, PriceMap};
use tokio::sync::watch;

/// Live price stream as seen by the aggregator.
///
/// Commands are fire-and-forget; their effect shows up on
/// [`connection_state`](PriceSource::connection_state).
pub trait PriceSource: Send + Sync {
    /// Start connecting if not already connecting or connected.
    fn connect(&self);
    /// Close the stream with a normal closure and cancel pending retries.
    fn disconnect(&self);
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
    /// Price map of the most recent message.
    fn prices(&self) -> watch::Receiver<Arc<PriceMap>>;
}
