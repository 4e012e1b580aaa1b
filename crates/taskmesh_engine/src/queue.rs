//! The pending event queue.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use taskmesh_protocol::SyncEvent;

/// A queued event with its client-local sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// Client-local sequence, assigned at enqueue time.
    pub seq: u64,
    /// The event itself.
    pub event: SyncEvent,
}

/// Mutations queued while offline, drained in causal order.
///
/// Events leave the queue only when the server confirms them or routes
/// them into conflict resolution; errored events stay put and are retried
/// on the next session. FIFO draining preserves per-entity order.
#[derive(Debug, Default)]
pub struct PendingQueue {
    events: Mutex<VecDeque<QueuedEvent>>,
    next_seq: AtomicU64,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Appends an event, returning its sequence number.
    pub fn enqueue(&self, event: SyncEvent) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push_back(QueuedEvent { seq, event });
        seq
    }

    /// Returns up to `limit` events from the front, oldest first, without
    /// removing them.
    pub fn batch(&self, limit: usize) -> Vec<QueuedEvent> {
        self.events
            .lock()
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Removes one event by sequence number once the server consumed it.
    pub fn acknowledge(&self, seq: u64) {
        self.events.lock().retain(|queued| queued.seq != seq);
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
