//! Pipeline factory: wires fetcher, cache, feed and aggregator from config.

use std::sync::Arc;

use anyhow::{Context, Result};
use pulse_core::config::PulseConfig;
use tracing::info;

use crate::aggregator::{AggregatorSettings, MarketAggregator};
use crate::catalog::{CatalogCache, HttpCatalogFetcher};
use crate::feed::PriceFeed;
use crate::network::NetworkMonitor;

/// Build a [`MarketAggregator`] over the HTTP catalog and the live price
/// stream described by `config`.
///
/// Nothing connects until the first subscription. Must be called from within
/// a tokio runtime.
pub fn build_aggregator(
    config: &PulseConfig,
    network: Arc<dyn NetworkMonitor>,
) -> Result<MarketAggregator> {
    config.validate()?;

    let fetcher =
        HttpCatalogFetcher::new(&config.catalog).context("building catalog HTTP client")?;
    let cache = Arc::new(CatalogCache::new(Arc::new(fetcher), config.catalog.ttl()));
    let feed = Arc::new(PriceFeed::spawn(&config.feed));

    info!(
        "[{}] pipeline ready: stream {} topic {}, catalog {} (ttl {:?})",
        config.meta.module_name,
        config.feed.ws_url,
        config.feed.topic,
        config.catalog.endpoint,
        config.catalog.ttl()
    );

    Ok(MarketAggregator::new(
        AggregatorSettings::from_config(config),
        cache,
        feed,
        network,
    ))
}
