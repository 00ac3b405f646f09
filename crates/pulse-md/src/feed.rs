//! Live price feed: the stream transport wired to the decoder.
//!
//! Every text frame is decoded into a fresh [`PriceMap`] that replaces the
//! previously published one. Decode problems are logged by the decoder and
//! surface here only as an empty map.

use std::sync::Arc;

use pulse_core::config::FeedConfig;
use pulse_core::ws::{OnMessageCallback, StreamTransport, TransportConfig};
use pulse_core::{ConnectionState, PriceMap};
use tokio::sync::watch;

use crate::PriceSource;
use crate::decoder;

/// Price stream backed by a [`StreamTransport`].
pub struct PriceFeed {
    transport: StreamTransport,
    prices_rx: watch::Receiver<Arc<PriceMap>>,
}

impl PriceFeed {
    /// Spawn the transport (idle until [`PriceSource::connect`]).
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &FeedConfig) -> Self {
        let (prices_tx, prices_rx) = watch::channel(Arc::new(PriceMap::default()));

        let on_text: OnMessageCallback = Arc::new(move |text: &str| {
            prices_tx.send_replace(Arc::new(decoder::parse_message(text)));
        });

        let transport_config = TransportConfig {
            url: config.ws_url.clone(),
            subscribe_msg: Some(decoder::build_subscribe(&config.topic)),
            ping_interval: config.ping_interval(),
            max_retries: config.max_retries,
            retry_base: config.retry_base(),
        };

        Self {
            transport: StreamTransport::spawn(transport_config, on_text),
            prices_rx,
        }
    }

    /// Close the socket and stop the transport task.
    pub async fn stop(&mut self) {
        self.transport.stop().await;
    }
}

impl PriceSource for PriceFeed {
    fn connect(&self) {
        self.transport.connect();
    }

    fn disconnect(&self) {
        self.transport.disconnect();
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.state()
    }

    fn prices(&self) -> watch::Receiver<Arc<PriceMap>> {
        self.prices_rx.clone()
    }
}
