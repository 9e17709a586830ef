use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{Alert, LocationKey};
use crate::ports::AlertSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Owned form of a store mutation, for channel subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub key: LocationKey,
    pub alert: Option<Alert>,
}

/// Broadcasts every alert store mutation to all current subscribers.
///
/// `publish` snapshots the subscriber list and calls each one outside the
/// lock, so subscribe/unsubscribe may run concurrently with a publish. A
/// subscriber removed mid-publish may still receive that one event.
pub struct AlertEventBus {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn AlertSubscriber>)>>,
}

impl Default for AlertEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        debug!(subscription = id.0, "Alert subscriber registered");
        id
    }

    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&LocationKey, Option<&Alert>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Unbounded channel subscription. Events queue until the receiver reads
    /// them; dropping the receiver turns further deliveries into no-ops.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelSubscriber { tx }));
        (id, rx)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    /// Delivers to every subscriber before returning. Returns how many were called.
    pub fn publish(&self, key: &LocationKey, alert: Option<&Alert>) -> usize {
        let snapshot: Vec<Arc<dyn AlertSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        for subscriber in &snapshot {
            subscriber.on_alert(key, alert);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl AlertSubscriber for ChannelSubscriber {
    fn on_alert(&self, key: &LocationKey, alert: Option<&Alert>) {
        let event = AlertEvent {
            key: key.clone(),
            alert: alert.cloned(),
        };
        if self.tx.send(event).is_err() {
            debug!(location = %key, "Alert channel receiver dropped, event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn key(id: &str) -> LocationKey {
        LocationKey::Named(id.to_string())
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = AlertEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            bus.subscribe_fn(move |k: &LocationKey, alert: Option<&Alert>| {
                seen.lock().unwrap().push((tag, k.clone(), alert.is_some()));
            });
        }

        assert_eq!(bus.publish(&key("home"), None), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, k, some)| *k == key("home") && !some));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = AlertEventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.subscribe_fn(move |_: &LocationKey, _: Option<&Alert>| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&key("x"), None);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&key("x"), None);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself_during_publish() {
        let bus = Arc::new(AlertEventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let bus_ref = bus.clone();
        let slot_ref = slot.clone();
        let id = bus.subscribe_fn(move |_: &LocationKey, _: Option<&Alert>| {
            if let Some(id) = *slot_ref.lock().unwrap() {
                bus_ref.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        assert_eq!(bus.publish(&key("x"), None), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription_queues_events() {
        let bus = AlertEventBus::new();
        let (_id, mut rx) = bus.subscribe_channel();

        bus.publish(&key("one"), None);
        bus.publish(&key("two"), None);

        assert_eq!(rx.recv().await.unwrap().key, key("one"));
        assert_eq!(rx.recv().await.unwrap().key, key("two"));
    }

    #[test]
    fn test_dropped_channel_receiver_is_harmless() {
        let bus = AlertEventBus::new();
        let (_id, rx) = bus.subscribe_channel();
        drop(rx);
        assert_eq!(bus.publish(&key("x"), None), 1);
    }
}
