//! Event Bus (spec.md §4.4).
//!
//! Named-topic pub/sub delivered synchronously, in subscription order, on
//! the thread that calls `emit`. A handler that panics is caught and logged
//! at debug level; it never stops later handlers from running and never
//! propagates to the emitter. Unsubscribing mid-emission is safe because
//! dispatch iterates over a snapshot taken at `emit` time.
//!
//! Per SPEC_FULL.md's design note, payloads are a typed enum
//! (`EventPayload`) rather than a freeform dictionary.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Stable topic identifiers (spec.md §4.4's topic table).
pub mod topics {
    pub const ACTIVATION_START: &str = "activation:start";
    pub const ACTIVATION_SUCCESS: &str = "activation:success";
    pub const ACTIVATION_ERROR: &str = "activation:error";

    pub const DEACTIVATION_START: &str = "deactivation:start";
    pub const DEACTIVATION_SUCCESS: &str = "deactivation:success";
    pub const DEACTIVATION_ERROR: &str = "deactivation:error";

    pub const VALIDATION_START: &str = "validation:start";
    pub const VALIDATION_SUCCESS: &str = "validation:success";
    pub const VALIDATION_FAILED: &str = "validation:failed";
    pub const VALIDATION_ERROR: &str = "validation:error";
    pub const VALIDATION_AUTO_FAILED: &str = "validation:auto-failed";
    pub const VALIDATION_AUTH_FAILED: &str = "validation:auth-failed";
    pub const VALIDATION_OFFLINE_SUCCESS: &str = "validation:offline-success";
    pub const VALIDATION_OFFLINE_FAILED: &str = "validation:offline-failed";

    pub const LICENSE_LOADED: &str = "license:loaded";
    pub const LICENSE_REVOKED: &str = "license:revoked";

    pub const OFFLINE_LICENSE_FETCHING: &str = "offlineLicense:fetching";
    pub const OFFLINE_LICENSE_FETCHED: &str = "offlineLicense:fetched";
    pub const OFFLINE_LICENSE_FETCH_ERROR: &str = "offlineLicense:fetchError";
    pub const OFFLINE_LICENSE_READY: &str = "offlineLicense:ready";
    pub const OFFLINE_LICENSE_VERIFIED: &str = "offlineLicense:verified";
    pub const OFFLINE_LICENSE_VERIFICATION_FAILED: &str = "offlineLicense:verificationFailed";

    pub const AUTOVALIDATION_CYCLE: &str = "autovalidation:cycle";
    pub const AUTOVALIDATION_STOPPED: &str = "autovalidation:stopped";

    pub const NETWORK_ONLINE: &str = "network:online";
    pub const NETWORK_OFFLINE: &str = "network:offline";

    pub const AUTH_TEST_START: &str = "auth_test:start";
    pub const AUTH_TEST_SUCCESS: &str = "auth_test:success";
    pub const AUTH_TEST_ERROR: &str = "auth_test:error";

    pub const HEARTBEAT_SUCCESS: &str = "heartbeat:success";
    pub const HEARTBEAT_ERROR: &str = "heartbeat:error";

    pub const SDK_RESET: &str = "sdk:reset";
    pub const SDK_ERROR: &str = "sdk:error";
    pub const SDK_DESTROYED: &str = "sdk:destroyed";
}

/// Typed event payload. `Empty` covers topics with no meaningful payload
/// (e.g. `activation:start`); `Json` carries structured data for everything
/// else, keeping handler signatures uniform without resorting to a
/// stringly-typed dictionary at the call site — producers build the `Value`
/// from a concrete struct via `serde_json::to_value`.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Empty,
    Json(Value),
    Message(String),
}

impl EventPayload {
    pub fn json(value: impl serde::Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => EventPayload::Json(v),
            Err(e) => EventPayload::Message(format!("failed to serialize event payload: {e}")),
        }
    }
}

pub type Handler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    handler: Handler,
}

/// Handle returned by `on()`. Dropping it does not unsubscribe — callers
/// must explicitly pass it to `off()`, matching spec.md's `on`/`off` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    topic_hash: u64,
    id: u64,
}

/// Synchronous, in-process pub/sub used for lifecycle notifications.
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for `topic`. Returns a `Subscription` usable with
    /// `off()`.
    pub fn on<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscribers.lock().expect("event bus mutex poisoned");
        subs.entry(topic.to_string()).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });

        Subscription {
            topic_hash: topic_hash(topic),
            id,
        }
    }

    /// Remove a previously registered handler for `topic`. No-op if absent.
    pub fn off(&self, topic: &str, subscription: Subscription) {
        if topic_hash(topic) != subscription.topic_hash {
            return;
        }
        let mut subs = self.subscribers.lock().expect("event bus mutex poisoned");
        if let Some(list) = subs.get_mut(topic) {
            list.retain(|s| s.id != subscription.id);
        }
    }

    /// Deliver `payload` to every handler registered for `topic`, in
    /// subscription order, on the calling thread. Dispatch iterates a
    /// snapshot cloned out from under the lock, so a handler that calls
    /// `on`/`off` on this same bus cannot deadlock or disturb the ongoing
    /// dispatch.
    pub fn emit(&self, topic: &str, payload: EventPayload) {
        let snapshot: Vec<Subscriber> = {
            let subs = self.subscribers.lock().expect("event bus mutex poisoned");
            subs.get(topic).cloned().unwrap_or_default()
        };

        for subscriber in snapshot {
            let handler = subscriber.handler.clone();
            let payload_ref = &payload;
            let result = catch_unwind(AssertUnwindSafe(|| handler(payload_ref)));
            if let Err(panic) = result {
                let message = panic_message(&panic);
                tracing::debug!(topic, error = %message, "event handler panicked; isolated from emitter");
            }
        }
    }

    /// Remove all handlers, optionally scoped to a single topic.
    pub fn clear(&self, topic: Option<&str>) {
        let mut subs = self.subscribers.lock().expect("event bus mutex poisoned");
        match topic {
            Some(t) => {
                subs.remove(t);
            }
            None => subs.clear(),
        }
    }
}

fn topic_hash(topic: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    topic.hash(&mut hasher);
    hasher.finish()
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn handlers_invoked_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.on("t", move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.on("t", move |_| o2.lock().unwrap().push(2));
        let o3 = order.clone();
        bus.on("t", move |_| o3.lock().unwrap().push(3));

        bus.emit("t", EventPayload::Empty);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn handler_panic_is_isolated() {
        let bus = EventBus::new();
        let after_called = Arc::new(AtomicUsize::new(0));

        bus.on("t", |_| panic!("boom"));
        let after = after_called.clone();
        bus.on("t", move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        });

        // Must not propagate/panic the test thread.
        bus.emit("t", EventPayload::Empty);
        assert_eq!(after_called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_only_targeted_subscription() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let sub1 = bus.on("t", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        bus.on("t", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        bus.off("t", sub1);
        bus.emit("t", EventPayload::Empty);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn unsubscribing_during_emission_does_not_disturb_dispatch() {
        let bus = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let bus_clone = bus.clone();
        let fired_for_first = fired.clone();
        // First handler unsubscribes a second handler mid-dispatch. Since
        // emit() iterates a snapshot, the second handler still runs for
        // this emission.
        let second_sub_cell: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let second_sub_cell_for_first = second_sub_cell.clone();
        bus.on("t", move |_| {
            fired_for_first.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = *second_sub_cell_for_first.lock().unwrap() {
                bus_clone.off("t", sub);
            }
        });

        let fired_for_second = fired.clone();
        let second_sub = bus.on("t", move |_| {
            fired_for_second.fetch_add(1, Ordering::SeqCst);
        });
        *second_sub_cell.lock().unwrap() = Some(second_sub);

        bus.emit("t", EventPayload::Empty);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Second emission: the unsubscribed handler no longer fires.
        bus.emit("t", EventPayload::Empty);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clear_single_topic_leaves_others_intact() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a1 = a.clone();
        bus.on("a", move |_| {
            a1.fetch_add(1, Ordering::SeqCst);
        });
        let b1 = b.clone();
        bus.on("b", move |_| {
            b1.fetch_add(1, Ordering::SeqCst);
        });

        bus.clear(Some("a"));
        bus.emit("a", EventPayload::Empty);
        bus.emit("b", EventPayload::Empty);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_topics_are_independent() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.on(topics::VALIDATION_SUCCESS, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(topics::VALIDATION_FAILED, EventPayload::Empty);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.emit(topics::VALIDATION_SUCCESS, EventPayload::Empty);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
