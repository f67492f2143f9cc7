//! Background expiry sweep.
//!
//! A tokio task ticks at a fixed interval and removes expired sessions until
//! shutdown is signalled. The first sweep runs one full interval after spawn.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Handle to a running sweep task.
pub struct SessionSweeper {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionSweeper {
    /// Spawn the sweep task on the current runtime.
    pub fn spawn(store: Arc<SessionStore>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(interval_secs = every.as_secs_f64(), "Session sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired();
                        debug!(removed, live = store.len(), "Sweep complete");
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Session sweeper shutting down");
                        break;
                    }
                }
            }

            info!("Session sweeper stopped");
        });

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Get the shutdown sender for triggering a stop from elsewhere.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session sweeper task failed");
        }
    }
}
