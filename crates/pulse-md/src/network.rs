//! Device network availability as an observable signal.
//!
//! Platform detection lives outside this crate; anything that can produce a
//! [`NetworkStatus`] stream implements [`NetworkMonitor`].

use pulse_core::NetworkStatus;
use tokio::sync::watch;
use tracing::info;

/// Source of network-availability updates.
pub trait NetworkMonitor: Send + Sync {
    /// Latest status, retained for late subscribers.
    fn status(&self) -> watch::Receiver<NetworkStatus>;
}

/// Monitor driven by explicit [`set`](ManualNetwork::set) calls.
///
/// Used by the runner, which has no platform signal, and by tests.
#[derive(Debug)]
pub struct ManualNetwork {
    tx: watch::Sender<NetworkStatus>,
}

impl ManualNetwork {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, status: NetworkStatus) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        if changed {
            info!("[network] now {status:?}");
        }
    }
}

impl Default for ManualNetwork {
    fn default() -> Self {
        Self::new(NetworkStatus::Available)
    }
}

impl NetworkMonitor for ManualNetwork {
    fn status(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }
}
