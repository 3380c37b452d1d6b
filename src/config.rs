//! Configuration for the admission daemon
//!
//! Values are handed to constructors; nothing in the core reads the
//! environment on its own.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub throttler: ThrottlerConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl Config {
    /// Load from `ADMISSION_*` environment variables, `__` separating sections
    pub fn from_env() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ADMISSION").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    #[default]
    Memory,
    Postgres {
        url: String,
        #[serde(default = "default_max_conn")]
        max_connections: u32,
    },
    Sqlite {
        path: String,
    },
}

impl DatabaseConfig {
    pub fn postgres(url: impl Into<String>) -> Self {
        Self::Postgres {
            url: url.into(),
            max_connections: default_max_conn(),
        }
    }
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::Sqlite { path: path.into() }
    }
    pub fn in_memory() -> Self {
        Self::Memory
    }
}

fn default_max_conn() -> u32 {
    5
}

/// Layout of a throttler: its name and the windows of its sub-queues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    #[serde(default = "default_throttler_name")]
    pub name: String,
    /// Window used for the implicit default queue and for queues created on demand
    #[serde(default = "default_window")]
    pub default_window: usize,
    /// Independently windowed sub-queues, e.g. one per execution cluster
    #[serde(default)]
    pub partitions: BTreeMap<String, usize>,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            name: default_throttler_name(),
            default_window: default_window(),
            partitions: BTreeMap::new(),
        }
    }
}

impl ThrottlerConfig {
    pub fn with_partition(mut self, queue: impl Into<String>, window: usize) -> Self {
        self.partitions.insert(queue.into(), window);
        self
    }
}

fn default_throttler_name() -> String {
    "default".to_string()
}
pub(crate) fn default_window() -> usize {
    20
}

/// Cadence of the reconciler backup loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_success_interval")]
    pub success_interval_secs: u64,
    #[serde(default = "default_failure_interval")]
    pub failure_interval_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            success_interval_secs: default_success_interval(),
            failure_interval_secs: default_failure_interval(),
        }
    }
}

impl BackupConfig {
    pub fn success_interval(&self) -> Duration {
        Duration::from_secs(self.success_interval_secs)
    }

    pub fn failure_interval(&self) -> Duration {
        Duration::from_secs(self.failure_interval_secs)
    }
}

fn default_success_interval() -> u64 {
    30
}
fn default_failure_interval() -> u64 {
    10
}
