//! Durable snapshot store
//!
//! Implement the `SnapshotStore` trait for any backend that can keep a blob
//! under a key. The crate ships an in-memory store plus SQLite and PostgreSQL
//! implementations.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Key/blob storage used to persist throttler snapshots
///
/// Implementations must be thread-safe. A missing key is `Ok(None)`, never
/// an error, so callers can tell a first run from a broken store.
///
/// # Example
///
/// ```ignore
/// use pipeline_admission::storage::SnapshotStore;
///
/// // SQLite for single-node deployments
/// let store = SqliteStore::connect("sqlite://admission.db").await?;
///
/// // Or implement your own
/// struct EtcdStore { /* ... */ }
/// impl SnapshotStore for EtcdStore { /* ... */ }
/// ```
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Read the blob stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Health check - verify the backend is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Prepare the backend schema
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    async fn migrate(&self) -> Result<()> {
        (**self).migrate().await
    }
}
