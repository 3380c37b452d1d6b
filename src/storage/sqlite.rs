//! SQLite implementation of SnapshotStore
//!
//! Ideal for:
//! - Local development
//! - Single-node deployments
//! - Testing

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{AdmissionError, DatabaseError, Result};
use crate::storage::SnapshotStore;

/// SQLite-backed snapshot store
///
/// # Example
///
/// ```ignore
/// // File-based for persistence
/// let store = SqliteStore::connect("sqlite://admission.db?mode=rwc").await?;
///
/// // In-memory for testing
/// let store = SqliteStore::connect("sqlite::memory:").await?;
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to SQLite database
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1) // single writer; also keeps :memory: on one connection
            .connect(url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Create in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Create from existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM throttler_snapshots WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO throttler_snapshots (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| AdmissionError::Database(DatabaseError::Migration(e.to_string())))?;
        Ok(())
    }
}
