//! In-process publish/subscribe registry keyed by event type.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use pulse_protocol::Envelope;
use uuid::Uuid;

/// Callback invoked for each matching envelope.
pub type EventCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Identifies a single registration for targeted removal.
///
/// Closures have no identity in Rust, so `on` hands back an id instead of
/// removing by callback reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry of subscriber callbacks.
///
/// Dispatch order follows registration order. A panicking subscriber is
/// logged and skipped; it never prevents later subscribers from running.
/// Emitting a type nobody subscribed to is a no-op.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: HashMap<String, Vec<(SubscriptionId, EventCallback)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event type.
    pub fn subscribe(&mut self, kind: impl Into<String>, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers
            .entry(kind.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a registration. Removing an unknown id is a no-op.
    pub fn unsubscribe(&mut self, kind: &str, id: SubscriptionId) {
        if let Some(list) = self.subscribers.get_mut(kind) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                self.subscribers.remove(kind);
            }
        }
    }

    /// Invoke every subscriber for `envelope.kind`, in registration order.
    pub fn emit(&self, envelope: &Envelope) {
        let Some(list) = self.subscribers.get(&envelope.kind) else {
            return;
        };
        for (id, callback) in list {
            if catch_unwind(AssertUnwindSafe(|| callback(envelope))).is_err() {
                tracing::error!(
                    kind = %envelope.kind,
                    subscription = %id,
                    "subscriber panicked during dispatch"
                );
            }
        }
    }

    /// Number of subscribers for an event type.
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.subscribers.get(kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn env(kind: &str) -> Envelope {
        Envelope::new(kind, serde_json::Value::Null)
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> EventCallback {
        let log = log.clone();
        Arc::new(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        d.subscribe("e", recorder(&log, "first"));
        d.subscribe("e", recorder(&log, "second"));
        d.subscribe("e", recorder(&log, "third"));
        d.emit(&env("e"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        d.subscribe("e", recorder(&log, "before"));
        d.subscribe("e", Arc::new(|_| panic!("intentional panic for testing")));
        d.subscribe("e", recorder(&log, "after"));
        d.emit(&env("e"));
        assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn emit_without_subscribers_is_noop() {
        let d = EventDispatcher::new();
        d.emit(&env("nobody.cares"));
    }

    #[test]
    fn unsubscribe_removes_only_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        let keep = recorder(&log, "keep");
        let drop_ = recorder(&log, "drop");
        d.subscribe("e", keep);
        let id = d.subscribe("e", drop_);
        d.unsubscribe("e", id);
        d.emit(&env("e"));
        assert_eq!(*log.lock().unwrap(), vec!["keep"]);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let mut d = EventDispatcher::new();
        let id = d.subscribe("a", Arc::new(|_| {}));
        // Wrong type, then already-removed id: both no-ops.
        d.unsubscribe("b", id);
        d.unsubscribe("a", id);
        d.unsubscribe("a", id);
        assert_eq!(d.subscriber_count("a"), 0);
    }

    #[test]
    fn only_matching_kind_dispatched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut d = EventDispatcher::new();
        d.subscribe("match", recorder(&log, "hit"));
        d.emit(&env("other"));
        d.emit(&env("match"));
        assert_eq!(*log.lock().unwrap(), vec!["hit"]);
    }
}
