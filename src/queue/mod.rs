//! Queue - Priority admission with a processing window
//!
//! Handles:
//! - Ordering of pending items (priority, then enqueue time)
//! - The pending -> processing transition under a concurrency bound
//! - Snapshots of a single queue for persistence

mod enhanced;
mod pending;

pub use enhanced::{EnhancedQueue, QueueSnapshot};
pub use pending::PendingSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A schedulable unit known to a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Opaque unique identifier
    pub key: String,
    /// Larger is admitted first
    pub priority: i64,
    /// Tie-break between equal priorities, oldest first
    pub enqueued_at: DateTime<Utc>,
}

/// Which side of the queue a key currently sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Registered, not yet admitted
    Pending,
    /// Admitted and holding a slot
    Processing,
}
