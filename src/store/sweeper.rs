//! Periodic purge of expired records.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::store::SecurityStore;

/// Background task that calls `purge_expired` on an interval.
pub struct StoreSweeper {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl StoreSweeper {
    /// Create a new sweeper.
    pub fn new(store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            store,
            clock,
            interval,
        }
    }

    /// Run one purge pass. Returns the number of records removed.
    pub async fn sweep(&self) -> usize {
        match self.store.purge_expired(self.clock.now()).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed, "Expired security records purged");
                }
                removed
            }
            Err(e) => {
                tracing::error!(error = %e, "Store sweep failed");
                0
            }
        }
    }

    /// Sweep until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Store sweeper stopping");
                    break;
                }
            }
        }
    }
}
