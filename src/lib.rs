//! # Pipeline Admission
//!
//! Priority admission control for a pipeline-execution engine, with
//! crash-safe persistence of the admission state.
//!
//! The crate provides:
//! - **Enhanced Queue**: pending/processing state machine under a runtime-adjustable window
//! - **Priority Ordering**: highest priority first, oldest first among equals
//! - **Throttler**: named group of independently windowed queues with Export/Import
//! - **Reconciler**: restores the throttler on startup and backs it up periodically
//! - **BYO Store**: in-memory, SQLite, PostgreSQL, or your own `SnapshotStore`
//!
//! ## Quick Start
//!
//! ```ignore
//! use pipeline_admission::{BackupConfig, MemoryStore, Reconciler, Throttler, DEFAULT_QUEUE};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let throttler = Arc::new(Throttler::new("default", None));
//!     let reconciler = Arc::new(Reconciler::new(
//!         MemoryStore::new(),
//!         throttler.clone(),
//!         BackupConfig::default(),
//!     ));
//!     reconciler.load_throttler().await;
//!     let backup = reconciler.clone().spawn();
//!
//!     // Producer
//!     throttler.add(DEFAULT_QUEUE, "pipeline-42/task-7", 10, chrono::Utc::now());
//!
//!     // Dispatcher
//!     if let Some(key) = throttler.pop_pending(DEFAULT_QUEUE) {
//!         // ... run the task, then free its slot
//!         throttler.remove_processing(&key);
//!     }
//!
//!     reconciler.shutdown_handle().shutdown();
//!     backup.await??;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod storage;
pub mod throttler;

// Re-exports for convenience
pub use config::{BackupConfig, Config, DatabaseConfig, ThrottlerConfig};
pub use error::{AdmissionError, DatabaseError, Result};
pub use queue::{EnhancedQueue, ItemState, QueueItem, QueueSnapshot};
pub use reconciler::{backup_key, BackupStats, Reconciler, RestoreOutcome, ShutdownHandle};
pub use storage::{MemoryStore, SnapshotStore};
pub use throttler::{
    AddKeyToQueueRequest, PopDetail, PopOutcome, QueueStats, Throttler, DEFAULT_QUEUE,
};

#[cfg(feature = "postgres")]
pub use storage::postgres::PostgresStore;

#[cfg(feature = "sqlite")]
pub use storage::sqlite::SqliteStore;

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AdmissionError, BackupConfig, EnhancedQueue, Reconciler, RestoreOutcome, Result,
        SnapshotStore, Throttler, ThrottlerConfig, DEFAULT_QUEUE,
    };

    #[cfg(feature = "postgres")]
    pub use crate::PostgresStore;

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteStore;
}
