//! Reconciler tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pipeline_admission::error::{AdmissionError, DatabaseError, Result};
use pipeline_admission::reconciler::{backup_key, Reconciler, RestoreOutcome};
use pipeline_admission::storage::{MemoryStore, SnapshotStore};
use pipeline_admission::{BackupConfig, Throttler, DEFAULT_QUEUE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Store whose first `failures` puts are rejected
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
    fail_reads: bool,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyStore {
    fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads {
            return Err(AdmissionError::Database(DatabaseError::Connection(
                "store unreachable".to_string(),
            )));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.attempts.lock().push(Instant::now());
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AdmissionError::Database(DatabaseError::Connection(
                "write rejected".to_string(),
            )));
        }
        self.inner.put(key, value).await
    }
}

fn gaps(attempts: &[Instant]) -> Vec<Duration> {
    attempts.windows(2).map(|w| w[1] - w[0]).collect()
}

fn assert_gap(gap: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    assert!(
        gap >= expected && gap < expected + Duration::from_secs(1),
        "expected ~{expected:?}, got {gap:?}"
    );
}

#[test]
fn test_backup_key_derived_from_name() {
    assert_eq!(
        backup_key("default"),
        "/devops/pipeline/throttler/reconciler/default"
    );
    let reconciler = Reconciler::new(
        MemoryStore::new(),
        Arc::new(Throttler::new("cluster-7", None)),
        BackupConfig::default(),
    );
    assert_eq!(
        reconciler.backup_key(),
        "/devops/pipeline/throttler/reconciler/cluster-7"
    );
}

#[tokio::test]
async fn test_load_not_found() {
    let throttler = Arc::new(Throttler::new("default", None));
    let reconciler = Reconciler::new(MemoryStore::new(), throttler.clone(), BackupConfig::default());

    assert_eq!(reconciler.load_throttler().await, RestoreOutcome::NotFound);
    assert_eq!(throttler.queue_names(), vec![DEFAULT_QUEUE]);
}

#[tokio::test]
async fn test_load_corrupt_snapshot() {
    let store = MemoryStore::new();
    store.put(&backup_key("default"), b"\x00garbage").await.unwrap();

    let throttler = Arc::new(Throttler::new("default", None));
    let reconciler = Reconciler::new(store, throttler.clone(), BackupConfig::default());

    let outcome = reconciler.load_throttler().await;
    assert!(matches!(outcome, RestoreOutcome::Corrupt(_)));
    assert!(!outcome.is_restored());
    assert!(throttler.pending_keys(DEFAULT_QUEUE).is_empty());
    assert_eq!(throttler.queue_window(DEFAULT_QUEUE), Some(20));
}

#[tokio::test]
async fn test_load_store_unavailable() {
    let store = FlakyStore {
        fail_reads: true,
        ..Default::default()
    };
    let throttler = Arc::new(Throttler::new("default", None));
    let reconciler = Reconciler::new(store, throttler, BackupConfig::default());

    let outcome = reconciler.load_throttler().await;
    match outcome {
        RestoreOutcome::StoreUnavailable(reason) => assert!(reason.contains("store unreachable")),
        other => panic!("Expected StoreUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_backup_then_restore_after_restart() {
    let store = MemoryStore::new();

    let before = Arc::new(Throttler::new("default", None));
    before.add(DEFAULT_QUEUE, "k1", 1, Utc::now());
    before.add(DEFAULT_QUEUE, "k2", 2, Utc::now());
    before.pop_pending(DEFAULT_QUEUE);
    let reconciler = Reconciler::new(store.clone(), before.clone(), BackupConfig::default());
    reconciler.backup_once().await.unwrap();
    assert_eq!(reconciler.metrics().successes, 1);

    // Simulated restart
    let after = Arc::new(Throttler::new("default", None));
    let reconciler = Reconciler::new(store, after.clone(), BackupConfig::default());
    assert_eq!(reconciler.load_throttler().await, RestoreOutcome::Restored);

    assert_eq!(after.processing_keys(DEFAULT_QUEUE), vec!["k2"]);
    assert_eq!(after.pending_keys(DEFAULT_QUEUE), vec!["k1"]);
}

#[tokio::test]
async fn test_backup_once_failure_is_reported() {
    let store = FlakyStore::failing(1);
    let reconciler = Reconciler::new(
        store,
        Arc::new(Throttler::new("default", None)),
        BackupConfig::default(),
    );

    assert!(reconciler.backup_once().await.is_err());
    assert!(reconciler.backup_once().await.is_ok());

    let stats = reconciler.metrics();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.consecutive_failures, 0);
}

#[tokio::test]
async fn test_consecutive_failures_accumulate() {
    let store = FlakyStore::failing(2);
    let reconciler = Reconciler::new(
        store,
        Arc::new(Throttler::new("default", None)),
        BackupConfig::default(),
    );

    assert!(reconciler.backup_once().await.is_err());
    assert!(reconciler.backup_once().await.is_err());
    let stats = reconciler.metrics();
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.consecutive_failures, 2);
    assert_eq!(stats.successes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_backup_loop_success_cadence() {
    let store = Arc::new(FlakyStore::default());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(Throttler::new("default", None)),
        BackupConfig::default(),
    ));

    let handle = reconciler.clone().spawn();
    tokio::time::sleep(Duration::from_secs(95)).await;

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 4);
    for gap in gaps(&attempts) {
        assert_gap(gap, 30);
    }

    reconciler.shutdown_handle().shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backup_loop_retries_after_failures() {
    let store = Arc::new(FlakyStore::failing(3));
    let throttler = Arc::new(Throttler::new("default", None));
    throttler.add(DEFAULT_QUEUE, "k1", 5, Utc::now());
    throttler.add(DEFAULT_QUEUE, "k2", 1, Utc::now());
    throttler.pop_pending(DEFAULT_QUEUE);

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        throttler.clone(),
        BackupConfig::default(),
    ));
    let handle = reconciler.clone().spawn();

    // t=0, 10, 20 fail; t=30 succeeds; t=60 succeeds
    tokio::time::sleep(Duration::from_secs(75)).await;

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 5);
    let gaps = gaps(&attempts);
    assert_gap(gaps[0], 10);
    assert_gap(gaps[1], 10);
    assert_gap(gaps[2], 10);
    assert_gap(gaps[3], 30);

    let stats = reconciler.metrics();
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.consecutive_failures, 0);

    // In-memory state is untouched by the failures
    assert_eq!(throttler.processing_keys(DEFAULT_QUEUE), vec!["k1"]);
    assert_eq!(throttler.pending_keys(DEFAULT_QUEUE), vec!["k2"]);
    assert!(store
        .get(&backup_key("default"))
        .await
        .unwrap()
        .is_some());

    reconciler.shutdown_handle().shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_custom_intervals() {
    let store = Arc::new(FlakyStore::failing(1));
    let config = BackupConfig {
        success_interval_secs: 5,
        failure_interval_secs: 2,
    };
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(Throttler::new("default", None)),
        config,
    ));
    let handle = reconciler.clone().spawn();

    tokio::time::sleep(Duration::from_secs(8)).await;
    let gaps = gaps(&store.attempts());
    assert_eq!(gaps.len(), 2);
    assert_gap(gaps[0], 2);
    assert_gap(gaps[1], 5);

    reconciler.shutdown_handle().shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_sleep() {
    let store = Arc::new(FlakyStore::default());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(Throttler::new("default", None)),
        BackupConfig::default(),
    ));
    let handle = reconciler.clone().spawn();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let started = Instant::now();
    reconciler.shutdown_handle().shutdown();
    handle.await.unwrap().unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(store.attempts().len(), 1);
}

#[tokio::test]
async fn test_shutdown_before_run() {
    let store = Arc::new(FlakyStore::default());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(Throttler::new("default", None)),
        BackupConfig::default(),
    ));

    reconciler.shutdown_handle().shutdown();
    reconciler.run().await.unwrap();
    assert!(store.attempts().is_empty());
}
