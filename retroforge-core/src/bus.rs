//! Topic-based event bus (§4.6).
//!
//! `publish` snapshots the subscriber list for a topic under a read lock, releases
//! the lock, then invokes each callback in registration order. This keeps publishers
//! from blocking on slow subscribers holding the lock, and lets a subscriber
//! unsubscribe itself or publish another event from inside its own callback without
//! deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Callback = Arc<dyn Fn(&dyn std::any::Any) + Send + Sync>;

struct Subscription {
    id: u64,
    callback: Callback,
}

/// A thread-safe publish/subscribe bus keyed by topic name.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: std::sync::atomic::AtomicU64,
}

/// Token returned by `subscribe`; call `unsubscribe` with it (or drop it via
/// `EventBus::unsubscribe`) to remove the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            topics: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Register `callback` on `topic`, returning a handle usable with `unsubscribe`.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&dyn std::any::Any) + Send + Sync + 'static,
    {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut topics = self.topics.write().unwrap();
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                callback: Arc::new(callback),
            });
        SubscriptionId(id)
    }

    /// Remove a previously registered subscription. No-op if already removed.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut topics = self.topics.write().unwrap();
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|s| s.id != id.0);
        }
    }

    /// Invoke every subscriber on `topic`, in registration order, with `payload`.
    /// Cross-topic publish ordering relative to other topics is unspecified.
    pub fn publish(&self, topic: &str, payload: &dyn std::any::Any) {
        let snapshot: Vec<Callback> = {
            let topics = self.topics.read().unwrap();
            match topics.get(topic) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.callback)).collect(),
                None => return,
            }
        };
        for callback in snapshot {
            callback(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn publish_invokes_subscribers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        bus.subscribe("tick", move |_| o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        bus.subscribe("tick", move |_| o2.lock().unwrap().push(2));

        bus.publish("tick", &0.016f64);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe("tick", move |_| *c.lock().unwrap() += 1);

        bus.publish("tick", &());
        bus.unsubscribe("tick", id);
        bus.publish("tick", &());

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn publish_on_unknown_topic_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nothing-subscribed", &());
    }

    #[test]
    fn subscriber_may_publish_another_topic_without_deadlock() {
        let bus = Arc::new(EventBus::new());
        let inner_bus = Arc::clone(&bus);
        bus.subscribe("outer", move |_| inner_bus.publish("inner", &()));
        let fired = Arc::new(Mutex::new(false));
        let f = Arc::clone(&fired);
        bus.subscribe("inner", move |_| *f.lock().unwrap() = true);

        bus.publish("outer", &());
        assert!(*fired.lock().unwrap());
    }
}
