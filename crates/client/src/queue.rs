//! Bounded FIFO buffer for envelopes that could not be sent immediately.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use pulse_protocol::Envelope;

/// An envelope waiting for the connection to become ready.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub envelope: Envelope,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            queued_at: Utc::now(),
        }
    }
}

/// Fixed-capacity FIFO queue with drop-oldest eviction.
///
/// Entries leave the queue only on successful send, eviction, or an
/// explicit [`clear`](Self::clear); order is never changed. Messages
/// queued before a reconnection are flushed before anything sent after it.
#[derive(Debug)]
pub struct MessageQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl MessageQueue {
    /// Default capacity when none is configured.
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Append an envelope. When full, the oldest entry is evicted first and
    /// returned so the caller can emit a warning event.
    pub fn enqueue(&mut self, envelope: Envelope) -> Option<QueueEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(QueueEntry::new(envelope));
        evicted
    }

    /// Next entry to flush, oldest first.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Put an entry back at the head after a failed send, preserving the
    /// original order for the next flush.
    pub fn requeue_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(kind: &str) -> Envelope {
        Envelope::new(kind, serde_json::Value::Null)
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q = MessageQueue::new(10);
        q.enqueue(env("a"));
        q.enqueue(env("b"));
        q.enqueue(env("c"));
        assert_eq!(q.pop_front().unwrap().envelope.kind, "a");
        assert_eq!(q.pop_front().unwrap().envelope.kind, "b");
        assert_eq!(q.pop_front().unwrap().envelope.kind, "c");
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn eviction_drops_oldest() {
        let mut q = MessageQueue::new(3);
        assert!(q.enqueue(env("a")).is_none());
        assert!(q.enqueue(env("b")).is_none());
        assert!(q.enqueue(env("c")).is_none());
        let evicted = q.enqueue(env("d")).expect("oldest entry evicted");
        assert_eq!(evicted.envelope.kind, "a");
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_front().unwrap().envelope.kind, "b");
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut q = MessageQueue::new(5);
        for i in 0..50 {
            q.enqueue(env(&format!("m{i}")));
            assert!(q.len() <= 5);
        }
        // The five newest survive.
        assert_eq!(q.pop_front().unwrap().envelope.kind, "m45");
    }

    #[test]
    fn requeue_front_restores_order() {
        let mut q = MessageQueue::new(10);
        q.enqueue(env("a"));
        q.enqueue(env("b"));
        let head = q.pop_front().unwrap();
        // Simulated failed send: the entry goes back to the head.
        q.requeue_front(head);
        assert_eq!(q.pop_front().unwrap().envelope.kind, "a");
        assert_eq!(q.pop_front().unwrap().envelope.kind, "b");
    }

    #[test]
    fn clear_empties_queue() {
        let mut q = MessageQueue::new(10);
        q.enqueue(env("a"));
        q.clear();
        assert!(q.is_empty());
    }
}
