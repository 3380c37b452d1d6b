//! Pipeline admission daemon
//!
//! Run with: `cargo run` or `pipeline-admission`
//!
//! Configuration via environment variables:
//! - ADMISSION_DATABASE__TYPE: memory, sqlite or postgres
//! - ADMISSION_DATABASE__PATH: file path (sqlite)
//! - ADMISSION_DATABASE__URL: connection string (postgres)
//! - ADMISSION_THROTTLER__NAME: throttler name, also the snapshot key suffix
//! - ADMISSION_THROTTLER__DEFAULT_WINDOW: default processing window (default: 20)
//! - ADMISSION_BACKUP__SUCCESS_INTERVAL_SECS / ADMISSION_BACKUP__FAILURE_INTERVAL_SECS

use std::sync::Arc;

use pipeline_admission::{
    config::{Config, DatabaseConfig},
    MemoryStore, Reconciler, SnapshotStore, Throttler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline_admission=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pipeline admission daemon...");

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid config, using in-memory defaults");
        Config::default()
    });

    match &config.database {
        DatabaseConfig::Memory => {
            tracing::warn!("Using in-memory snapshot store; state will not survive restarts");
            run_daemon(config.clone(), MemoryStore::new()).await
        }

        #[cfg(feature = "postgres")]
        DatabaseConfig::Postgres {
            url,
            max_connections,
        } => {
            use pipeline_admission::PostgresStore;

            tracing::info!("Connecting to PostgreSQL...");
            let store = PostgresStore::connect_with_options(url, *max_connections).await?;
            store.migrate().await?;
            tracing::info!("Database migrated");

            run_daemon(config.clone(), store).await
        }

        #[cfg(feature = "sqlite")]
        DatabaseConfig::Sqlite { path } => {
            use pipeline_admission::SqliteStore;

            tracing::info!("Connecting to SQLite at {}...", path);
            let url = if path == ":memory:" {
                "sqlite::memory:".to_string()
            } else {
                format!("sqlite://{}?mode=rwc", path)
            };
            let store = SqliteStore::connect(&url).await?;
            store.migrate().await?;
            tracing::info!("Database migrated");

            run_daemon(config.clone(), store).await
        }

        #[allow(unreachable_patterns)]
        _ => {
            anyhow::bail!(
                "Database backend not enabled. Compile with --features postgres or --features sqlite"
            );
        }
    }
}

async fn run_daemon<S: SnapshotStore>(config: Config, store: S) -> anyhow::Result<()> {
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "Snapshot store not reachable yet, backups will retry");
    }

    let throttler = Arc::new(Throttler::from_config(&config.throttler));
    let reconciler = Arc::new(Reconciler::new(store, throttler.clone(), config.backup));

    let outcome = reconciler.load_throttler().await;
    tracing::info!(throttler = %throttler.name(), outcome = ?outcome, "Throttler ready");
    for stats in throttler.stats() {
        tracing::info!(
            queue = %stats.queue,
            window = stats.window,
            pending = stats.pending,
            processing = stats.processing,
            "Queue state"
        );
    }

    let shutdown = reconciler.shutdown_handle();
    let backup = reconciler.clone().spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received ctrl-c, shutting down");

    shutdown.shutdown();
    backup.await??;

    Ok(())
}
