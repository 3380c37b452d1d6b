//! Counters for the backup loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct BackupMetrics {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub consecutive_failures: AtomicU64,
    pub last_export_micros: AtomicU64,
}

impl BackupMetrics {
    pub fn stats(&self) -> BackupStats {
        BackupStats {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_export_cost: Duration::from_micros(self.last_export_micros.load(Ordering::Relaxed)),
        }
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_export_cost(&self, cost: Duration) {
        let micros = u64::try_from(cost.as_micros()).unwrap_or(u64::MAX);
        self.last_export_micros.store(micros, Ordering::Relaxed);
    }
}

/// Snapshot of backup counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStats {
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_export_cost: Duration,
}
