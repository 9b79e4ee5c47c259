//! In-memory outbound queue.
//!
//! One pending entry per collection: a later change to the same collection
//! replaces the earlier one, since a push always sends the full collection.
//! The queue lives for the process lifetime and is not persisted.

use crate::sync::types::{Collection, SyncEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Sync queue for coalescing local changes until the next push.
#[derive(Debug, Default)]
pub struct SyncQueue {
    pending: HashMap<Collection, SyncEvent>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change to `collection`.
    pub fn enqueue(&mut self, collection: Collection, records: usize) {
        self.pending.insert(
            collection,
            SyncEvent {
                collection,
                records,
                updated_at: Utc::now(),
            },
        );
    }

    /// Drop events recorded at or before `cutoff`; newer ones stay for the next push.
    pub fn clear_through(&mut self, cutoff: DateTime<Utc>) {
        self.pending.retain(|_, e| e.updated_at > cutoff);
    }

    /// Get number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut SyncQueue) -> Vec<SyncEvent> {
        let mut events: Vec<SyncEvent> = queue.pending.drain().map(|(_, e)| e).collect();
        events.sort_by_key(|e| e.updated_at);
        events
    }

    #[test]
    fn test_enqueue_and_drain() {
        let mut queue = SyncQueue::new();
        queue.enqueue(Collection::Goals, 1);
        assert_eq!(queue.len(), 1);

        let drained = drain(&mut queue);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].collection, Collection::Goals);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_collection_coalesces() {
        let mut queue = SyncQueue::new();
        queue.enqueue(Collection::Logs, 1);
        queue.enqueue(Collection::Logs, 2);
        queue.enqueue(Collection::Goals, 3);

        assert_eq!(queue.len(), 2);
        let drained = drain(&mut queue);
        let logs = drained
            .iter()
            .find(|e| e.collection == Collection::Logs)
            .unwrap();
        assert_eq!(logs.records, 2);
    }

    #[test]
    fn test_clear_through_keeps_newer_changes() {
        let mut queue = SyncQueue::new();
        queue.enqueue(Collection::Goals, 1);
        let cutoff = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        queue.enqueue(Collection::Logs, 1);

        queue.clear_through(cutoff);
        assert_eq!(queue.len(), 1);
        assert_eq!(drain(&mut queue)[0].collection, Collection::Logs);
    }
}
