//! Throttler - Named owner of one or more windowed queues
//!
//! Provides:
//! - Independent concurrency partitions (e.g. one window per cluster)
//! - Multi-queue admission for keys that must clear several windows
//! - Export/Import of the complete state for crash recovery

mod snapshot;

pub use snapshot::{ThrottlerSnapshot, SNAPSHOT_VERSION};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::ThrottlerConfig;
use crate::error::{AdmissionError, Result};
use crate::queue::{EnhancedQueue, ItemState};

/// Queue used when a throttler is built without partitions
pub const DEFAULT_QUEUE: &str = "default";

/// Request to place a key into one queue, see [`Throttler::add_key_to_queues`]
#[derive(Debug, Clone)]
pub struct AddKeyToQueueRequest {
    pub queue: String,
    /// Window applied if the queue does not exist yet
    pub window: Option<usize>,
    pub priority: i64,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-queue verdict of [`Throttler::pop_pending_key`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopDetail {
    pub queue: String,
    pub can_pop: bool,
    pub reason: Option<String>,
}

/// Result of trying to admit a specific key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopOutcome {
    pub popped: bool,
    pub details: Vec<PopDetail>,
}

/// Point-in-time counters for one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub window: usize,
    pub pending: usize,
    pub processing: usize,
}

/// Named group of enhanced queues behind a single lock.
///
/// Every operation takes the same mutex, so `export` always observes one
/// consistent instant across all sub-queues. The lock is never held across
/// an `.await`.
pub struct Throttler {
    name: String,
    default_window: usize,
    /// Queue layout restored when state is reset
    layout: BTreeMap<String, usize>,
    queues: Mutex<BTreeMap<String, EnhancedQueue>>,
}

impl Throttler {
    /// Create a named throttler.
    ///
    /// Without config there is a single [`DEFAULT_QUEUE`] with the default window.
    /// `name` always wins over `config.name`; use [`Throttler::from_config`] to
    /// take the name from the config.
    pub fn new(name: impl Into<String>, config: Option<&ThrottlerConfig>) -> Self {
        let default_window = config
            .map(|c| c.default_window)
            .unwrap_or_else(crate::config::default_window);

        let layout = match config {
            Some(c) if !c.partitions.is_empty() => c.partitions.clone(),
            _ => BTreeMap::from([(DEFAULT_QUEUE.to_string(), default_window)]),
        };

        Self {
            name: name.into(),
            default_window,
            queues: Mutex::new(build_queues(&layout)),
            layout,
        }
    }

    /// Create a throttler named after its config
    pub fn from_config(config: &ThrottlerConfig) -> Self {
        Self::new(config.name.clone(), Some(config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_window(&self) -> usize {
        self.default_window
    }

    /// Create a queue, or update its window if it exists
    pub fn add_queue(&self, queue: &str, window: usize) {
        let mut queues = self.queues.lock();
        queues
            .entry(queue.to_string())
            .or_insert_with(|| EnhancedQueue::new(window))
            .set_processing_window(window);
    }

    /// Change a queue's window. Returns false if the queue does not exist.
    pub fn set_queue_window(&self, queue: &str, window: usize) -> bool {
        let mut queues = self.queues.lock();
        match queues.get_mut(queue) {
            Some(q) => {
                q.set_processing_window(window);
                true
            }
            None => false,
        }
    }

    pub fn queue_window(&self, queue: &str) -> Option<usize> {
        self.queues.lock().get(queue).map(|q| q.processing_window())
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }

    /// Register `key` in `queue`, creating the queue with the default window if needed
    pub fn add(&self, queue: &str, key: &str, priority: i64, enqueued_at: DateTime<Utc>) {
        if key.is_empty() {
            return;
        }
        let mut queues = self.queues.lock();
        queues
            .entry(queue.to_string())
            .or_insert_with(|| EnhancedQueue::new(self.default_window))
            .add(key, priority, enqueued_at);
    }

    /// Register `key` in several queues at once
    pub fn add_key_to_queues(&self, key: &str, requests: &[AddKeyToQueueRequest]) {
        if key.is_empty() {
            return;
        }
        let mut queues = self.queues.lock();
        for req in requests {
            let window = req.window.unwrap_or(self.default_window);
            let queue = queues
                .entry(req.queue.clone())
                .or_insert_with(|| EnhancedQueue::new(window));
            if let Some(w) = req.window {
                queue.set_processing_window(w);
            }
            queue.add(key, req.priority, req.enqueued_at);
        }
    }

    /// Admit the best pending key of `queue`
    pub fn pop_pending(&self, queue: &str) -> Option<String> {
        let mut queues = self.queues.lock();
        let key = queues.get_mut(queue)?.pop_pending()?;
        debug!(throttler = %self.name, queue, key = %key, "Admitted pending key");
        Some(key)
    }

    /// Admit `key` only if every queue holding it pending would pop it now.
    ///
    /// On refusal nothing moves and the details name the blocking queues.
    pub fn pop_pending_key(&self, key: &str) -> PopOutcome {
        let mut queues = self.queues.lock();

        let details: Vec<PopDetail> = queues
            .iter()
            .filter(|(_, q)| q.in_pending(key))
            .map(|(name, q)| {
                let reason = if q.can_pop(key) {
                    None
                } else if q.processing_len() >= q.processing_window() {
                    Some(format!(
                        "processing window {} is full ({} processing)",
                        q.processing_window(),
                        q.processing_len()
                    ))
                } else {
                    let head = q.peek_pending().map(|i| i.key.clone()).unwrap_or_default();
                    Some(format!("not at the head of the queue, next is {head}"))
                };
                PopDetail {
                    queue: name.clone(),
                    can_pop: reason.is_none(),
                    reason,
                }
            })
            .collect();

        let popped = !details.is_empty() && details.iter().all(|d| d.can_pop);
        if popped {
            for detail in &details {
                if let Some(q) = queues.get_mut(&detail.queue) {
                    q.pop_pending();
                }
            }
            debug!(throttler = %self.name, key, queues = details.len(), "Admitted key");
        }

        PopOutcome { popped, details }
    }

    /// Free the slots held by `key` in every queue.
    ///
    /// Must be called once the unit terminates (success, failure or
    /// cancellation); otherwise the slot is never reused.
    pub fn remove_processing(&self, key: &str) -> bool {
        let mut queues = self.queues.lock();
        let mut removed = false;
        for q in queues.values_mut() {
            removed |= q.remove_processing(key);
        }
        removed
    }

    /// Forget `key` in every queue, pending or processing
    pub fn remove(&self, key: &str) -> bool {
        let mut queues = self.queues.lock();
        let mut removed = false;
        for q in queues.values_mut() {
            removed |= q.remove(key).is_some();
        }
        removed
    }

    pub fn in_pending(&self, queue: &str, key: &str) -> bool {
        self.queues.lock().get(queue).is_some_and(|q| q.in_pending(key))
    }

    pub fn in_processing(&self, queue: &str, key: &str) -> bool {
        self.queues
            .lock()
            .get(queue)
            .is_some_and(|q| q.in_processing(key))
    }

    pub fn in_queue(&self, queue: &str, key: &str) -> bool {
        self.queues.lock().get(queue).is_some_and(|q| q.in_queue(key))
    }

    pub fn state(&self, queue: &str, key: &str) -> Option<ItemState> {
        self.queues.lock().get(queue).and_then(|q| q.state(key))
    }

    pub fn pending_keys(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.pending_keys())
            .unwrap_or_default()
    }

    pub fn processing_keys(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.processing_keys())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Vec<QueueStats> {
        self.queues
            .lock()
            .iter()
            .map(|(name, q)| QueueStats {
                queue: name.clone(),
                window: q.processing_window(),
                pending: q.pending_len(),
                processing: q.processing_len(),
            })
            .collect()
    }

    /// Serialize every queue's pending items, processing membership and window
    pub fn export(&self) -> Result<Vec<u8>> {
        let snapshot = {
            let queues = self.queues.lock();
            ThrottlerSnapshot::capture(&self.name, &queues)
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Replace the current state with an exported snapshot.
    ///
    /// Configured queues missing from the snapshot are recreated empty with
    /// their configured window. On decode failure the throttler is reset to
    /// its empty initial layout.
    pub fn import(&self, bytes: &[u8]) -> Result<()> {
        let decoded = ThrottlerSnapshot::decode(bytes);
        let mut queues = self.queues.lock();

        match decoded {
            Ok(snapshot) => {
                if snapshot.name != self.name {
                    warn!(
                        throttler = %self.name,
                        snapshot = %snapshot.name,
                        "Importing snapshot exported under another name"
                    );
                }
                let mut restored = snapshot.into_queues();
                for (queue, window) in &self.layout {
                    restored
                        .entry(queue.clone())
                        .or_insert_with(|| EnhancedQueue::new(*window));
                }
                *queues = restored;
                Ok(())
            }
            Err(reason) => {
                *queues = build_queues(&self.layout);
                Err(AdmissionError::SnapshotDecode(reason))
            }
        }
    }

    /// Drop all items and restore the initial queue layout
    pub fn reset(&self) {
        *self.queues.lock() = build_queues(&self.layout);
    }
}

fn build_queues(layout: &BTreeMap<String, usize>) -> BTreeMap<String, EnhancedQueue> {
    layout
        .iter()
        .map(|(name, window)| (name.clone(), EnhancedQueue::new(*window)))
        .collect()
}
