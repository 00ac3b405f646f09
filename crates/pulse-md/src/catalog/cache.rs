//! Per-category catalog cache with time-based invalidation.
//!
//! Each category owns one slot guarded by a [`tokio::sync::Mutex`]. The lock
//! is held across the fetch, so callers that arrive while a fetch is in
//! flight wait for it and then find a fresh snapshot instead of issuing a
//! second request.

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{CatalogSnapshot, Category};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CatalogError, CatalogSource};

type Slot = Mutex<Option<Arc<CatalogSnapshot>>>;

/// TTL cache in front of a [`CatalogSource`].
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    ttl: Duration,
    spot: Slot,
    future: Slot,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            spot: Mutex::new(None),
            future: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, category: Category) -> &Slot {
        match category {
            Category::Spot => &self.spot,
            Category::Future => &self.future,
        }
    }

    /// Serve the held snapshot if it is non-empty and within TTL, otherwise
    /// fetch.
    ///
    /// A failed fetch leaves the stale snapshot in place but still reports
    /// the failure.
    pub async fn get(&self, category: Category) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let mut slot = self.slot(category).lock().await;

        if let Some(snap) = slot.as_ref() {
            if snap.is_fresh(Instant::now(), self.ttl) {
                debug!(
                    "[catalog] {category} served from cache (age {:?})",
                    snap.age(Instant::now())
                );
                return Ok(Arc::clone(snap));
            }
        }

        self.fetch_into(category, &mut slot).await
    }

    /// Fetch regardless of freshness.
    pub async fn refresh(&self, category: Category) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let mut slot = self.slot(category).lock().await;
        self.fetch_into(category, &mut slot).await
    }

    /// Held snapshot, fresh or not, without I/O. Waits for an in-flight fetch.
    pub async fn peek(&self, category: Category) -> Option<Arc<CatalogSnapshot>> {
        self.slot(category).lock().await.clone()
    }

    async fn fetch_into(
        &self,
        category: Category,
        slot: &mut Option<Arc<CatalogSnapshot>>,
    ) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        match self.source.fetch(category).await {
            Ok(snap) => {
                info!("[catalog] {category} fetched: {} instruments", snap.instruments.len());
                let snap = Arc::new(snap);
                *slot = Some(Arc::clone(&snap));
                Ok(snap)
            }
            Err(e) => {
                warn!("[catalog] {category} fetch failed: {e}");
                Err(e)
            }
        }
    }
}
