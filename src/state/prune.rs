use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use super::StateStore;

/// How often the prune worker runs
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Background worker that removes state for endpoints no longer being checked
pub struct PruneWorker {
    store: Arc<StateStore>,
    interval: Duration,
    max_age: chrono::Duration,
    running: Arc<AtomicBool>,
}

impl PruneWorker {
    pub fn new(store: Arc<StateStore>, interval: Duration, max_age: chrono::Duration) -> Self {
        Self {
            store,
            interval,
            max_age,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker; it exits when `shutdown` flips to true
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Prune worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            // The first tick completes immediately; skip it so startup does not prune
            interval.tick().await;

            while !*shutdown.borrow() {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.run_once() {
                            Ok(0) => {}
                            Ok(removed) => tracing::info!("Pruned state for {} endpoints", removed),
                            Err(e) => tracing::error!(error = %e, "State pruning failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::info!("Prune worker stopped");
        })
    }

    /// Prune once against the current time
    pub fn run_once(&self) -> Result<usize, super::PersistenceError> {
        let cutoff = chrono::Utc::now() - self.max_age;
        self.store.prune(cutoff)
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
