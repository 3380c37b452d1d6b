//! Versioned wire format of an exported throttler

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::queue::{EnhancedQueue, QueueSnapshot};

/// Bumped whenever the layout below changes incompatibly
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottlerSnapshot {
    pub version: u32,
    pub name: String,
    pub queues: BTreeMap<String, QueueSnapshot>,
}

impl ThrottlerSnapshot {
    pub(crate) fn capture(name: &str, queues: &BTreeMap<String, EnhancedQueue>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            name: name.to_string(),
            queues: queues
                .iter()
                .map(|(queue, q)| (queue.clone(), q.snapshot()))
                .collect(),
        }
    }

    /// Parse and validate an exported snapshot
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        let snapshot: Self = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            ));
        }
        Ok(snapshot)
    }

    pub(crate) fn into_queues(self) -> BTreeMap<String, EnhancedQueue> {
        self.queues
            .into_iter()
            .map(|(queue, snap)| (queue, EnhancedQueue::from_snapshot(snap)))
            .collect()
    }
}
