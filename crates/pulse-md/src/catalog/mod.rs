//! Instrument catalog: the HTTP fetcher and the per-category TTL cache.

pub mod cache;
pub mod fetcher;

use async_trait::async_trait;
use pulse_core::{CatalogSnapshot, Category};
use thiserror::Error;

pub use cache::CatalogCache;
pub use fetcher::HttpCatalogFetcher;

/// Why a catalog request failed.
///
/// Every variant is reported to callers the same way, as one failure carrying
/// a message; the variants only exist for logging and tests. Nothing here is
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Connection, timeout, or body read failure.
    #[error("catalog request failed: {0}")]
    Network(String),

    /// Non-2xx HTTP status.
    #[error("catalog request returned HTTP {0}")]
    Status(u16),

    /// Body is not the expected JSON document.
    #[error("catalog response malformed: {0}")]
    Malformed(String),

    /// Body (or its `data` field) is missing.
    #[error("catalog response empty")]
    Empty,
}

/// One-shot catalog request for a single category.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, category: Category) -> Result<CatalogSnapshot, CatalogError>;
}
