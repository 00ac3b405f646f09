//! Market aggregator: catalog, live prices, selection and status merged into
//! one published [`AggregatedSnapshot`].
//!
//! # Lifecycle
//!
//! ```text
//! first subscribe()       ──► session: stream connect + combine task + poll task
//! last subscription drop  ──► teardown timer (grace period)
//!   resubscribe in grace  ──► timer ignored, session kept
//!   grace elapses         ──► abort tasks, stream disconnect
//! ```
//!
//! The snapshot channel outlives sessions, so a new subscriber always reads the
//! last published snapshot first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use pulse_core::config::PulseConfig;
use pulse_core::{
    AggregatedSnapshot, CatalogSnapshot, Category, ConnectionState, Instrument,
    MSG_NETWORK_UNAVAILABLE, MSG_NO_DATA, MSG_STREAM_DISCONNECTED, NetworkStatus, PriceMap,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::PriceSource;
use crate::catalog::{CatalogCache, CatalogError};
use crate::combine::{AggregatorInputs, CatalogView, Latest};
use crate::network::NetworkMonitor;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Timing and initial selection for a [`MarketAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// Minimum time the loading flag stays raised for a user-driven load.
    pub min_loading: Duration,
    /// Delay between the last observer leaving and teardown.
    pub teardown_grace: Duration,
    /// Background catalog re-request interval while observed.
    pub poll_interval: Duration,
    pub default_category: Category,
}

impl AggregatorSettings {
    pub fn from_config(config: &PulseConfig) -> Self {
        Self {
            min_loading: config.aggregator.min_loading(),
            teardown_grace: config.aggregator.teardown_grace(),
            poll_interval: config.catalog.poll_interval(),
            default_category: config.aggregator.default_category,
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from_config(&PulseConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Pure merge rules
// ---------------------------------------------------------------------------

/// Every loaded instrument with its live price applied where one is known,
/// sorted by symbol then category.
pub fn merge_prices(catalog: &CatalogView, live: &AHashMap<String, f64>) -> Vec<Instrument> {
    let mut merged: Vec<Instrument> = catalog
        .values()
        .flat_map(|snap| snap.instruments.iter())
        .map(|inst| match live.get(&inst.symbol) {
            Some(price) => inst.with_price(*price),
            None => inst.clone(),
        })
        .collect();
    merged.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.category.cmp(&b.category)));
    merged
}

/// Status message, highest priority first: no network, stream given up,
/// nothing to list.
pub fn derive_status(
    network: NetworkStatus,
    connection: ConnectionState,
    listed: usize,
) -> Option<&'static str> {
    if !network.is_available() {
        Some(MSG_NETWORK_UNAVAILABLE)
    } else if connection.is_disconnected() {
        Some(MSG_STREAM_DISCONNECTED)
    } else if listed == 0 {
        Some(MSG_NO_DATA)
    } else {
        None
    }
}

/// Snapshot for one reading of the inputs plus the accumulated live prices.
pub fn build_snapshot(latest: &Latest, live: &AHashMap<String, f64>) -> AggregatedSnapshot {
    let instruments: Vec<Instrument> = merge_prices(&latest.catalog, live)
        .into_iter()
        .filter(|inst| inst.category == latest.category)
        .collect();
    let error =
        derive_status(latest.network, latest.connection, instruments.len()).map(str::to_string);

    AggregatedSnapshot {
        selected_category: latest.category,
        instruments,
        is_loading: latest.loading,
        error,
    }
}

// ---------------------------------------------------------------------------
// MarketAggregator
// ---------------------------------------------------------------------------

/// Reference-counted aggregator. Clones share one session.
#[derive(Clone)]
pub struct MarketAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: AggregatorSettings,
    cache: Arc<CatalogCache>,
    prices: Arc<dyn PriceSource>,
    network: Arc<dyn NetworkMonitor>,
    category_tx: watch::Sender<Category>,
    /// User-driven loads in flight.
    loading_tx: watch::Sender<u32>,
    catalog_tx: watch::Sender<Arc<CatalogView>>,
    snapshot_tx: watch::Sender<Arc<AggregatedSnapshot>>,
    /// Last streamed price per symbol. Per-message maps only carry the
    /// symbols that ticked; folding them here keeps every symbol's last
    /// known price across messages and sessions.
    live: Mutex<AHashMap<String, f64>>,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    observers: usize,
    /// Bumped on every subscribe and on the last release; a teardown timer
    /// only acts if the generation it captured is still current.
    generation: u64,
    /// Running session tasks, `None` while torn down.
    tasks: Option<Vec<JoinHandle<()>>>,
}

impl MarketAggregator {
    pub fn new(
        settings: AggregatorSettings,
        cache: Arc<CatalogCache>,
        prices: Arc<dyn PriceSource>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let initial = AggregatedSnapshot {
            selected_category: settings.default_category,
            ..AggregatedSnapshot::default()
        };
        let (category_tx, _) = watch::channel(settings.default_category);
        let (loading_tx, _) = watch::channel(0u32);
        let (catalog_tx, _) = watch::channel(Arc::new(CatalogView::new()));
        let (snapshot_tx, _) = watch::channel(Arc::new(initial));

        Self {
            inner: Arc::new(Inner {
                settings,
                cache,
                prices,
                network,
                category_tx,
                loading_tx,
                catalog_tx,
                snapshot_tx,
                live: Mutex::new(AHashMap::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Register an observer, starting the session if none is running.
    /// Must be called from within a tokio runtime.
    ///
    /// The session stays up until the last [`SnapshotSubscription`] has been
    /// dropped for the full grace period.
    pub fn subscribe(&self) -> SnapshotSubscription {
        {
            let mut lc = self.inner.lifecycle();
            lc.observers += 1;
            lc.generation += 1;
            if lc.tasks.is_none() {
                lc.tasks = Some(Inner::start_session(&self.inner));
            }
        }
        SnapshotSubscription {
            rx: self.inner.snapshot_tx.subscribe(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> Arc<AggregatedSnapshot> {
        Arc::clone(&self.inner.snapshot_tx.borrow())
    }

    pub fn selected_category(&self) -> Category {
        *self.inner.category_tx.borrow()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lifecycle().observers
    }

    /// Whether a session (stream plus background tasks) is running.
    pub fn is_active(&self) -> bool {
        self.inner.lifecycle().tasks.is_some()
    }

    /// Switch the listed category.
    ///
    /// The published list is re-filtered from what is already loaded. A fetch
    /// is only started when the category has never loaded and a session is
    /// running.
    pub fn select_category(&self, category: Category) {
        let changed = self.inner.category_tx.send_if_modified(|current| {
            let changed = *current != category;
            *current = category;
            changed
        });
        if !changed {
            return;
        }
        info!("[aggregator] category -> {category}");

        if self.inner.catalog_tx.borrow().contains_key(&category) {
            return;
        }

        let mut lc = self.inner.lifecycle();
        if let Some(tasks) = lc.tasks.as_mut() {
            tasks.retain(|t| !t.is_finished());
            let inner = Arc::clone(&self.inner);
            tasks.push(tokio::spawn(async move {
                if let Err(e) = inner.load(category).await {
                    warn!("[aggregator] {category} load failed: {e}");
                }
            }));
        }
    }

    /// Ask the stream to connect and reload the selected category.
    ///
    /// The loading flag is raised for at least the configured minimum, even
    /// when the cache answers at once.
    /// The stream is only reconnected while a session is running; without
    /// observers only the catalog is reloaded.
    pub async fn retry(&self) -> Result<(), CatalogError> {
        {
            let lc = self.inner.lifecycle();
            if lc.tasks.is_some() {
                info!("[aggregator] retry requested");
                self.inner.prices.connect();
            } else {
                info!("[aggregator] retry requested with no observers, catalog only");
            }
        }
        let category = self.selected_category();
        self.inner.load(category).await.map(|_| ())
    }

    /// Close the price stream now. Catalog and last prices stay published.
    pub fn disconnect(&self) {
        info!("[aggregator] disconnect requested");
        self.inner.prices.disconnect();
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_session(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("[aggregator] session starting ({})", *self.category_tx.borrow());

        let inputs = AggregatorInputs::new(
            self.catalog_tx.subscribe(),
            self.prices.prices(),
            self.category_tx.subscribe(),
            self.loading_tx.subscribe(),
            self.prices.connection_state(),
            self.network.status(),
        );
        self.prices.connect();

        let combine = tokio::spawn(Arc::clone(self).run_combine(inputs));
        let poll = tokio::spawn(Arc::clone(self).run_poll());
        vec![combine, poll]
    }

    /// Recompute on every input change until the session is aborted.
    async fn run_combine(self: Arc<Self>, mut inputs: AggregatorInputs) {
        let mut folded: Option<Arc<PriceMap>> = None;

        loop {
            let latest = inputs.latest();
            let next = {
                let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
                if !folded.as_ref().is_some_and(|p| Arc::ptr_eq(p, &latest.prices)) {
                    live.extend(latest.prices.iter().map(|(s, p)| (s.clone(), *p)));
                    folded = Some(Arc::clone(&latest.prices));
                }
                build_snapshot(&latest, &live)
            };

            if **self.snapshot_tx.borrow() != next {
                debug!(
                    "[aggregator] publish {} {} instruments loading={} error={:?}",
                    next.selected_category,
                    next.instruments.len(),
                    next.is_loading,
                    next.error
                );
                self.snapshot_tx.send_replace(Arc::new(next));
            }

            if !inputs.changed().await {
                debug!("[aggregator] all inputs closed");
                break;
            }
        }
    }

    /// Initial load, then quiet background refreshes of the selected category.
    async fn run_poll(self: Arc<Self>) {
        let category = *self.category_tx.borrow();
        if let Err(e) = self.load(category).await {
            warn!("[aggregator] initial {category} load failed: {e}");
        }

        let period = self.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let category = *self.category_tx.borrow();
            match self.cache.get(category).await {
                Ok(snap) => self.store_catalog(category, &snap),
                Err(e) => debug!("[aggregator] background {category} refresh failed: {e}"),
            }
        }
    }

    /// User-driven load: raises the loading flag for at least `min_loading`.
    async fn load(&self, category: Category) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let _loading = LoadingGuard::raise(&self.loading_tx);
        let started = Instant::now();

        let result = self.cache.get(category).await;
        if let Ok(snap) = &result {
            self.store_catalog(category, snap);
        }

        let elapsed = started.elapsed();
        if elapsed < self.settings.min_loading {
            tokio::time::sleep(self.settings.min_loading - elapsed).await;
        }
        result
    }

    fn store_catalog(&self, category: Category, snap: &Arc<CatalogSnapshot>) {
        self.catalog_tx.send_if_modified(|view| {
            if view.get(&category).is_some_and(|held| Arc::ptr_eq(held, snap)) {
                return false;
            }
            let mut next = CatalogView::clone(view);
            next.insert(category, Arc::clone(snap));
            *view = Arc::new(next);
            true
        });
    }

    /// Drop one observer; the last one arms the teardown timer.
    fn release(self: &Arc<Self>) {
        let generation = {
            let mut lc = self.lifecycle();
            lc.observers = lc.observers.saturating_sub(1);
            if lc.observers > 0 {
                return;
            }
            lc.generation += 1;
            lc.generation
        };

        let grace = self.settings.teardown_grace;
        debug!("[aggregator] no observers, teardown in {grace:?}");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    inner.teardown_if_idle(generation);
                });
            }
            Err(_) => self.teardown_if_idle(generation),
        }
    }

    fn teardown_if_idle(&self, generation: u64) {
        let tasks = {
            let mut lc = self.lifecycle();
            if lc.observers > 0 || lc.generation != generation {
                return;
            }
            lc.tasks.take()
        };

        if let Some(tasks) = tasks {
            for task in tasks {
                task.abort();
            }
            self.prices.disconnect();
            info!("[aggregator] session torn down");
        }
    }
}

/// Counts one in-flight load on the loading channel until dropped.
struct LoadingGuard<'a> {
    tx: &'a watch::Sender<u32>,
}

impl<'a> LoadingGuard<'a> {
    fn raise(tx: &'a watch::Sender<u32>) -> Self {
        tx.send_modify(|n| *n += 1);
        Self { tx }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// SnapshotSubscription
// ---------------------------------------------------------------------------

/// An observer of the aggregator. Dropping it releases the observer slot.
pub struct SnapshotSubscription {
    rx: watch::Receiver<Arc<AggregatedSnapshot>>,
    inner: Arc<Inner>,
}

impl SnapshotSubscription {
    /// Most recent snapshot, without marking it seen.
    pub fn latest(&self) -> Arc<AggregatedSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> Option<Arc<AggregatedSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    /// Wait until a snapshot satisfies `pred`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&AggregatedSnapshot) -> bool,
    ) -> Option<Arc<AggregatedSnapshot>> {
        let snap = self.rx.wait_for(|s: &Arc<AggregatedSnapshot>| pred(&**s)).await.ok()?;
        Some(Arc::clone(&snap))
    }
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        self.inner.release();
    }
}
