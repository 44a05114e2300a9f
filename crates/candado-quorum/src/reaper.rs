//! Background expiry reaper
//!
//! Periodic hygiene sweep for store backends whose TTL is not evaluated
//! natively. Correctness never depends on it: an expired row already counts
//! as absent everywhere else, the sweep only stops stale rows accumulating.

use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};

use candado_store::ExpirySweep;

use crate::config::ReaperConfig;

/// Owns a timer-driven sweep task over a set of sweepable backends
pub struct ExpiryReaper {
    stop_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl ExpiryReaper {
    /// Start sweeping the given targets on the configured cadence.
    pub fn start(targets: Vec<Arc<dyn ExpirySweep>>, config: ReaperConfig) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(config.sweep_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut swept = 0usize;
                        let mut live = 0usize;
                        for target in &targets {
                            swept += target.sweep_expired().await;
                            live += target.live_entries().await;
                        }
                        if swept > 0 {
                            counter!("reaper_swept_total").increment(swept as u64);
                            debug!(swept, live, "removed expired entries");
                        }
                        gauge!("lock_entries_live").set(live as f64);
                    }
                    _ = stop_rx.recv() => {
                        break;
                    }
                }
            }
        });

        info!("expiry reaper started");
        Self { stop_tx, handle }
    }

    /// Request the sweep loop to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Stop the sweep loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.handle.await;
    }
}
