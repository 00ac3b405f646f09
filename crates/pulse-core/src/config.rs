//! Configuration parsing for the market-feed core.
//!
//! All settings come from a single JSON file. Every field has a default, so an
//! empty object is a valid config and [`PulseConfig::default`] matches it.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "pulse", "log_path": "/tmp/log" },
//!   "feed": { "ws_url": "wss://ws.example-market.io/stream", "max_retries": 3 },
//!   "catalog": { "endpoint": "https://api.example-market.io/v1/instruments", "ttl_ms": 30000 },
//!   "aggregator": { "default_category": "spot" }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::PulseError;
use crate::types::Category;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Module metadata (name, log path).
    pub meta: ModuleMeta,
    /// Price stream settings.
    pub feed: FeedConfig,
    /// Catalog endpoint and cache settings.
    pub catalog: CatalogConfig,
    /// Aggregator timing and initial selection.
    pub aggregator: AggregatorConfig,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleMeta {
    pub module_name: String,
    pub log_path: Option<String>,
}

impl Default for ModuleMeta {
    fn default() -> Self {
        Self {
            module_name: "pulse".into(),
            log_path: None,
        }
    }
}

/// Price stream (WebSocket) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Full WebSocket URL.
    pub ws_url: String,
    /// Topic named in the subscription message.
    pub topic: String,
    /// Scheduled retries after the initial attempt before giving up.
    pub max_retries: u32,
    /// Linear backoff step: retry `n` waits `n * retry_base_ms`.
    pub retry_base_ms: u64,
    /// Keep-alive ping interval in seconds. `None` disables pinging.
    pub ping_interval_sec: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            topic: "coinIndex".into(),
            max_retries: 3,
            retry_base_ms: 2000,
            ping_interval_sec: None,
        }
    }
}

impl FeedConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_sec.map(Duration::from_secs)
    }
}

/// Catalog endpoint and cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog URL; `?future=<bool>` is appended per category.
    pub endpoint: String,
    /// How long a fetched catalog is served without I/O.
    pub ttl_ms: u64,
    /// Per-request timeout for the HTTP client.
    pub request_timeout_ms: u64,
    /// Background re-request interval while observed.
    pub poll_interval_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            ttl_ms: 30_000,
            request_timeout_ms: 10_000,
            poll_interval_ms: 30_000,
        }
    }
}

impl CatalogConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Aggregator timing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Minimum time the loading flag stays raised for a user-driven fetch.
    pub min_loading_ms: u64,
    /// Grace period between the last observer leaving and teardown.
    pub teardown_grace_ms: u64,
    /// Category selected at startup.
    pub default_category: Category,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_loading_ms: 1000,
            teardown_grace_ms: 5000,
            default_category: Category::Spot,
        }
    }
}

impl AggregatorConfig {
    pub fn min_loading(&self) -> Duration {
        Duration::from_millis(self.min_loading_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

impl PulseConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PulseError> {
        if url::Url::parse(&self.feed.ws_url).is_err() {
            return Err(PulseError::Config(format!("invalid feed.ws_url: {}", self.feed.ws_url)));
        }
        if url::Url::parse(&self.catalog.endpoint).is_err() {
            return Err(PulseError::Config(format!(
                "invalid catalog.endpoint: {}",
                self.catalog.endpoint
            )));
        }
        if self.feed.topic.is_empty() {
            return Err(PulseError::Config("feed.topic must not be empty".into()));
        }
        if self.catalog.poll_interval_ms == 0 {
            return Err(PulseError::Config("catalog.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

fn default_ws_url() -> String {
    "wss://ws.example-market.io/stream".into()
}

fn default_catalog_endpoint() -> String {
    "https://api.example-market.io/v1/instruments".into()
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<PulseConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PulseConfig = serde_json::from_str(&content)
        .map_err(|e| PulseError::Parse(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
