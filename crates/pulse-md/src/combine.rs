//! Combine-latest fan-in over the aggregator's input channels.
//!
//! Every input is a [`watch`] channel, so each one always holds a value: the
//! seed it was created with until its producer publishes. Waiting therefore
//! never stalls on a source that has not emitted yet, and a real value always
//! replaces the seed.
//!
//! [`AggregatorInputs::changed`] resolves as soon as any input moves;
//! [`AggregatorInputs::latest`] then marks every input as seen, so updates that
//! land together collapse into one recomputation.

use std::collections::BTreeMap;
use std::sync::Arc;

use pulse_core::{CatalogSnapshot, Category, ConnectionState, NetworkStatus, PriceMap};
use tokio::sync::watch;

/// Last successfully loaded catalog per category.
pub type CatalogView = BTreeMap<Category, Arc<CatalogSnapshot>>;

/// One consistent reading of every input.
#[derive(Debug, Clone)]
pub struct Latest {
    pub catalog: Arc<CatalogView>,
    pub prices: Arc<PriceMap>,
    pub category: Category,
    pub loading: bool,
    pub connection: ConnectionState,
    pub network: NetworkStatus,
}

/// Receivers for every aggregator input.
pub struct AggregatorInputs {
    catalog: watch::Receiver<Arc<CatalogView>>,
    prices: watch::Receiver<Arc<PriceMap>>,
    category: watch::Receiver<Category>,
    /// Number of user-driven loads in flight.
    loading: watch::Receiver<u32>,
    connection: watch::Receiver<ConnectionState>,
    network: watch::Receiver<NetworkStatus>,
    /// Inputs whose producer is gone; they keep their last value.
    closed: [bool; 6],
}

impl AggregatorInputs {
    pub fn new(
        catalog: watch::Receiver<Arc<CatalogView>>,
        prices: watch::Receiver<Arc<PriceMap>>,
        category: watch::Receiver<Category>,
        loading: watch::Receiver<u32>,
        connection: watch::Receiver<ConnectionState>,
        network: watch::Receiver<NetworkStatus>,
    ) -> Self {
        Self {
            catalog,
            prices,
            category,
            loading,
            connection,
            network,
            closed: [false; 6],
        }
    }

    /// Read every input, marking all of them seen.
    pub fn latest(&mut self) -> Latest {
        Latest {
            catalog: Arc::clone(&self.catalog.borrow_and_update()),
            prices: Arc::clone(&self.prices.borrow_and_update()),
            category: *self.category.borrow_and_update(),
            loading: *self.loading.borrow_and_update() > 0,
            connection: *self.connection.borrow_and_update(),
            network: *self.network.borrow_and_update(),
        }
    }

    /// Wait until any input has an unseen value.
    ///
    /// Returns `false` once every producer has gone away.
    pub async fn changed(&mut self) -> bool {
        loop {
            if self.closed.iter().all(|c| *c) {
                return false;
            }

            let closed = self.closed;
            let (idx, result) = tokio::select! {
                r = self.catalog.changed(), if !closed[0] => (0, r),
                r = self.prices.changed(), if !closed[1] => (1, r),
                r = self.category.changed(), if !closed[2] => (2, r),
                r = self.loading.changed(), if !closed[3] => (3, r),
                r = self.connection.changed(), if !closed[4] => (4, r),
                r = self.network.changed(), if !closed[5] => (5, r),
            };

            match result {
                Ok(()) => return true,
                Err(_) => self.closed[idx] = true,
            }
        }
    }
}
