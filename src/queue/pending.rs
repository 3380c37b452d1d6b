//! Pending set - keyed items ordered by priority, then enqueue time

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::QueueItem;

/// Sort position of a pending item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingOrder {
    priority: i64,
    enqueued_at: DateTime<Utc>,
    /// Insertion sequence, breaks ties between identical timestamps
    sequence: u64,
}

impl PartialOrd for PendingOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingOrder {
    // Smallest sorts first: higher priority, then older, then earlier insert.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Ordered container over not-yet-admitted items
#[derive(Debug, Default)]
pub struct PendingSet {
    items: HashMap<String, (QueueItem, PendingOrder)>,
    order: BTreeMap<PendingOrder, String>,
    next_sequence: u64,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key or move an existing one to its new position
    pub fn upsert(&mut self, key: &str, priority: i64, enqueued_at: DateTime<Utc>) {
        let sequence = match self.items.remove(key) {
            Some((_, old)) => {
                self.order.remove(&old);
                old.sequence
            }
            None => {
                let seq = self.next_sequence;
                self.next_sequence += 1;
                seq
            }
        };

        let position = PendingOrder {
            priority,
            enqueued_at,
            sequence,
        };
        let item = QueueItem {
            key: key.to_string(),
            priority,
            enqueued_at,
        };
        self.order.insert(position, key.to_string());
        self.items.insert(key.to_string(), (item, position));
    }

    pub fn get(&self, key: &str) -> Option<&QueueItem> {
        self.items.get(key).map(|(item, _)| item)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<QueueItem> {
        let (item, position) = self.items.remove(key)?;
        self.order.remove(&position);
        Some(item)
    }

    /// Highest-ranked item without removing it
    pub fn peek(&self) -> Option<&QueueItem> {
        let (_, key) = self.order.first_key_value()?;
        self.get(key)
    }

    /// Remove and return the highest-ranked item
    pub fn pop(&mut self) -> Option<QueueItem> {
        let (_, key) = self.order.pop_first()?;
        self.items.remove(&key).map(|(item, _)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in pop order
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> + '_ {
        self.order.values().filter_map(move |key| self.get(key))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }
}
