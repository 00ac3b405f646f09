//! Scripted collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulse_core::{CatalogSnapshot, Category, ConnectionState, Instrument, PriceMap};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::PriceSource;
use crate::catalog::{CatalogError, CatalogSource};

/// Catalog source returning a configured result per category after an
/// optional delay, counting calls.
pub struct FakeCatalog {
    calls: AtomicUsize,
    delay: Duration,
    results: Mutex<HashMap<Category, Result<Vec<Instrument>, CatalogError>>>,
}

impl FakeCatalog {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            results: Mutex::new(HashMap::new()),
        })
    }

    pub fn set(&self, category: Category, result: Result<Vec<Instrument>, CatalogError>) {
        self.results.lock().unwrap().insert(category, result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn fetch(&self, category: Category) -> Result<CatalogSnapshot, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self
            .results
            .lock()
            .unwrap()
            .get(&category)
            .cloned()
            .unwrap_or(Err(CatalogError::Empty));
        result.map(|list| CatalogSnapshot::new(list, 7, Instant::now()))
    }
}

/// Price source whose connection state and price maps are pushed by the
/// test. `connect` reports `Connected` at once.
pub struct FakePrices {
    state: watch::Sender<ConnectionState>,
    prices: watch::Sender<Arc<PriceMap>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakePrices {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (prices, _) = watch::channel(Arc::new(PriceMap::default()));
        Arc::new(Self {
            state,
            prices,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, prices: &[(&str, f64)]) {
        let map = prices.iter().map(|(s, p)| (s.to_string(), *p)).collect();
        self.prices.send_replace(Arc::new(map));
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl PriceSource for FakePrices {
    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connected);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn prices(&self) -> watch::Receiver<Arc<PriceMap>> {
        self.prices.subscribe()
    }
}
