//! Market data structures: the values flowing from the feed and the catalog
//! into published snapshots.
//!
//! Every struct here is treated as immutable once built: a price change
//! produces a new [`Instrument`], a fetch produces a new [`CatalogSnapshot`],
//! and every recomputation publishes a new [`AggregatedSnapshot`].

use std::collections::HashSet;
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::enums::Category;

/// Live prices decoded from a single stream message: `symbol -> price`.
///
/// Rebuilt per message, never accumulated across messages.
pub type PriceMap = AHashMap<String, f64>;

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// A tradable instrument with its most recent known price.
///
/// Identity is `(symbol, category)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub category: Category,
    pub price: f64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, category: Category, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            category,
            price,
        }
    }

    /// Copy of this instrument carrying `price`.
    pub fn with_price(&self, price: f64) -> Self {
        Self {
            symbol: self.symbol.clone(),
            category: self.category,
            price,
        }
    }

    /// Identity key.
    pub fn key(&self) -> (&str, Category) {
        (&self.symbol, self.category)
    }
}

// ---------------------------------------------------------------------------
// CatalogSnapshot
// ---------------------------------------------------------------------------

/// Result of one successful catalog fetch.
///
/// Replaced wholesale on every fetch, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    /// Unique by `(symbol, category)`, in server order.
    pub instruments: Vec<Instrument>,
    /// `time` field of the server response.
    pub server_timestamp: i64,
    /// Local clock reading when the response arrived.
    pub fetched_at: Instant,
}

impl CatalogSnapshot {
    /// Build a snapshot, dropping repeated `(symbol, category)` entries (the
    /// first occurrence wins).
    pub fn new(instruments: Vec<Instrument>, server_timestamp: i64, fetched_at: Instant) -> Self {
        let mut seen = HashSet::with_capacity(instruments.len());
        let instruments = instruments
            .into_iter()
            .filter(|i| seen.insert((i.symbol.clone(), i.category)))
            .collect();
        Self {
            instruments,
            server_timestamp,
            fetched_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Time elapsed since the fetch, measured against `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// Fresh means non-empty and no older than `ttl`.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        !self.is_empty() && self.age(now) <= ttl
    }
}

// ---------------------------------------------------------------------------
// AggregatedSnapshot
// ---------------------------------------------------------------------------

/// Status shown when the device reports no network.
pub const MSG_NETWORK_UNAVAILABLE: &str = "Network unavailable.";
/// Status shown when the price stream gave up reconnecting.
pub const MSG_STREAM_DISCONNECTED: &str = "Real-time price update cannot update.";
/// Status shown when the selected category has nothing to list.
pub const MSG_NO_DATA: &str = "No market data to show.";

/// The published, display-ready view of the market.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedSnapshot {
    pub selected_category: Category,
    /// Filtered by `selected_category`, sorted by symbol ascending.
    pub instruments: Vec<Instrument>,
    pub is_loading: bool,
    pub error: Option<String>,
}
