//! Enhanced queue - pending set plus processing set under a window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use super::{ItemState, PendingSet, QueueItem};

/// Priority queue that admits at most `processing_window` items at a time.
///
/// The queue itself is not synchronized; callers wrap it in a lock
/// (see [`crate::throttler::Throttler`]).
///
/// A key is in at most one of pending and processing. Shrinking the window
/// never evicts processing items, it only withholds further admissions.
#[derive(Debug)]
pub struct EnhancedQueue {
    pending: PendingSet,
    processing: HashMap<String, QueueItem>,
    processing_window: usize,
}

/// Serializable state of one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub window: usize,
    /// In pop order
    pub pending: Vec<QueueItem>,
    /// Sorted by key
    pub processing: Vec<QueueItem>,
}

impl EnhancedQueue {
    pub fn new(processing_window: usize) -> Self {
        Self {
            pending: PendingSet::new(),
            processing: HashMap::new(),
            processing_window,
        }
    }

    /// Register or re-prioritize a key.
    ///
    /// No-op for an empty key or a key that is already processing.
    pub fn add(&mut self, key: &str, priority: i64, enqueued_at: DateTime<Utc>) {
        if key.is_empty() {
            return;
        }
        if self.processing.contains_key(key) {
            trace!(key, "Ignoring add for processing key");
            return;
        }
        self.pending.upsert(key, priority, enqueued_at);
    }

    /// Admit the best pending item if the window has room
    pub fn pop_pending(&mut self) -> Option<String> {
        if !self.has_capacity() {
            return None;
        }
        let item = self.pending.pop()?;
        let key = item.key.clone();
        self.processing.insert(key.clone(), item);
        Some(key)
    }

    /// Next item `pop_pending` would return, ignoring the window
    pub fn peek_pending(&self) -> Option<&QueueItem> {
        self.pending.peek()
    }

    /// Whether `key` would be returned by the next `pop_pending`
    pub fn can_pop(&self, key: &str) -> bool {
        self.has_capacity() && self.pending.peek().is_some_and(|item| item.key == key)
    }

    /// Free the slot held by `key`. Returns false if it was not processing.
    pub fn remove_processing(&mut self, key: &str) -> bool {
        self.processing.remove(key).is_some()
    }

    /// Forget `key` wherever it is
    pub fn remove(&mut self, key: &str) -> Option<ItemState> {
        if self.pending.remove(key).is_some() {
            Some(ItemState::Pending)
        } else if self.processing.remove(key).is_some() {
            Some(ItemState::Processing)
        } else {
            None
        }
    }

    pub fn in_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn in_processing(&self, key: &str) -> bool {
        self.processing.contains_key(key)
    }

    pub fn in_queue(&self, key: &str) -> bool {
        self.in_pending(key) || self.in_processing(key)
    }

    pub fn state(&self, key: &str) -> Option<ItemState> {
        if self.in_pending(key) {
            Some(ItemState::Pending)
        } else if self.in_processing(key) {
            Some(ItemState::Processing)
        } else {
            None
        }
    }

    pub fn get_pending(&self, key: &str) -> Option<&QueueItem> {
        self.pending.get(key)
    }

    pub fn set_processing_window(&mut self, window: usize) {
        self.processing_window = window;
    }

    pub fn processing_window(&self) -> usize {
        self.processing_window
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn processing_len(&self) -> usize {
        self.processing.len()
    }

    /// Pending keys in pop order
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.iter().map(|item| item.key.clone()).collect()
    }

    /// Processing keys, sorted
    pub fn processing_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.processing.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut processing: Vec<_> = self.processing.values().cloned().collect();
        processing.sort_by(|a, b| a.key.cmp(&b.key));

        QueueSnapshot {
            window: self.processing_window,
            pending: self.pending.iter().cloned().collect(),
            processing,
        }
    }

    /// Rebuild a queue from a snapshot.
    ///
    /// Processing wins if a key shows up on both sides.
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = Self::new(snapshot.window);
        for item in snapshot.processing {
            if !item.key.is_empty() {
                queue.processing.insert(item.key.clone(), item);
            }
        }
        for item in snapshot.pending {
            queue.add(&item.key, item.priority, item.enqueued_at);
        }
        queue
    }

    fn has_capacity(&self) -> bool {
        self.processing.len() < self.processing_window
    }
}

impl Default for EnhancedQueue {
    fn default() -> Self {
        Self::new(crate::config::default_window())
    }
}
