//! Reconciler - Crash recovery and periodic backup of the throttler
//!
//! The reconciler is responsible for:
//! - Restoring the throttler from the durable store on startup
//! - Exporting and persisting the throttler on a fixed cadence
//! - Retrying sooner after a failed write
//! - Stopping cleanly when asked to

mod metrics;

pub use metrics::{BackupMetrics, BackupStats};

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BackupConfig;
use crate::error::Result;
use crate::storage::SnapshotStore;
use crate::throttler::Throttler;

/// Store key under which a throttler's snapshot is kept
pub fn backup_key(throttler_name: &str) -> String {
    format!("/devops/pipeline/throttler/reconciler/{throttler_name}")
}

/// What happened when the reconciler tried to restore its throttler.
///
/// Every variant except `Restored` leaves the throttler empty; none of them
/// is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Snapshot found and imported
    Restored,
    /// Nothing stored yet (first run)
    NotFound,
    /// Snapshot present but could not be decoded
    Corrupt(String),
    /// The store could not be read
    StoreUnavailable(String),
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored)
    }
}

/// Cloneable handle that stops a running backup loop
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Owns a throttler and keeps its snapshot in a durable store
pub struct Reconciler<S: SnapshotStore> {
    store: S,
    throttler: Arc<Throttler>,
    config: BackupConfig,
    key: String,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<BackupMetrics>,
}

impl<S: SnapshotStore> Reconciler<S> {
    /// Create a reconciler. The store key is derived from the throttler's name.
    pub fn new(store: S, throttler: Arc<Throttler>, config: BackupConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let key = backup_key(throttler.name());

        Self {
            store,
            throttler,
            config,
            key,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            metrics: Arc::new(BackupMetrics::default()),
        }
    }

    pub fn backup_key(&self) -> &str {
        &self.key
    }

    pub fn metrics(&self) -> BackupStats {
        self.metrics.stats()
    }

    /// Get a handle to stop the backup loop
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Restore the throttler from the last persisted snapshot.
    ///
    /// Admission only depends on ordering among currently known keys, so a
    /// lost or broken snapshot degrades to an empty throttler.
    pub async fn load_throttler(&self) -> RestoreOutcome {
        let backup = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!(key = %self.key, "No throttler snapshot found, starting empty");
                return RestoreOutcome::NotFound;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read throttler snapshot, starting empty");
                return RestoreOutcome::StoreUnavailable(e.to_string());
            }
        };

        match self.throttler.import(&backup) {
            Ok(()) => {
                info!(
                    key = %self.key,
                    queues = self.throttler.queue_names().len(),
                    "Restored throttler from snapshot"
                );
                RestoreOutcome::Restored
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to import throttler snapshot, ignoring");
                RestoreOutcome::Corrupt(e.to_string())
            }
        }
    }

    /// Export the throttler and write it to the store once.
    ///
    /// Any failure, export or write, counts as a failed cycle.
    pub async fn backup_once(&self) -> Result<()> {
        match self.persist().await {
            Ok(()) => {
                self.metrics.record_success();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        let begin = Instant::now();
        let snapshot = self.throttler.export()?;
        let cost = begin.elapsed();
        self.metrics.record_export_cost(cost);

        self.store.put(&self.key, &snapshot).await?;
        debug!(key = %self.key, bytes = snapshot.len(), cost = ?cost, "Throttler backed up");
        Ok(())
    }

    /// Run the backup loop until shutdown.
    ///
    /// Failures are logged and retried after the failure interval; they never
    /// reach the caller and never touch in-memory state.
    pub async fn run(&self) -> Result<()> {
        info!(
            key = %self.key,
            success_interval = ?self.config.success_interval(),
            failure_interval = ?self.config.failure_interval(),
            "Starting throttler backup loop"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let delay = match self.backup_once().await {
                Ok(()) => self.config.success_interval(),
                Err(e) => {
                    let interval = self.config.failure_interval();
                    error!(
                        key = %self.key,
                        error = %e,
                        retry_in = ?interval,
                        "Failed to back up throttler"
                    );
                    interval
                }
            };

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Backup loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(key = %self.key, "Throttler backup loop stopped");
        Ok(())
    }

    /// Run the backup loop on its own task
    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
