//! Fan-out of dashboard events to connected clients
//!
//! Every subscriber owns a bounded outbox. Publishing never waits on a
//! subscriber: if an outbox is full the event is dropped for that subscriber
//! only and [`EventBus::dropped_count`] is incremented. Clients catch up on
//! the next metrics sample, and get the full status again when they reconnect.

use crate::config::DEFAULT_OUTBOX_CAPACITY;
use crate::events::Event;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

pub type SubscriberId = u64;

/// Registry entry for one connected client
#[derive(Debug)]
struct Subscriber {
    outbox: mpsc::Sender<Event>,
    registered_at: DateTime<Utc>,
}

#[derive(Debug)]
struct BusInner {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

/// Cloneable handle to the shared event hub
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus whose subscribers buffer at most `capacity` events each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new outbox.
    ///
    /// The returned subscription deregisters itself when dropped.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (outbox, receiver) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            outbox,
            registered_at: Utc::now(),
        };

        let total = {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.insert(id, subscriber);
            subscribers.len()
        };
        info!("Subscriber {id} registered ({total} active)");

        Subscription {
            id,
            receiver,
            bus: self.clone(),
        }
    }

    /// Remove a subscriber from the registry. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let (removed, total) = {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        if let Some(subscriber) = removed {
            let connected_for = Utc::now() - subscriber.registered_at;
            info!(
                "Subscriber {id} removed after {}s ({total} active)",
                connected_for.num_seconds()
            );
        }
    }

    /// Send `event` to every registered subscriber without waiting.
    ///
    /// Returns how many outboxes accepted the event.
    pub fn publish(&self, event: Event) -> usize {
        let outboxes: Vec<(SubscriberId, mpsc::Sender<Event>)> = {
            let subscribers = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers
                .iter()
                .map(|(id, subscriber)| (*id, subscriber.outbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, outbox) in outboxes {
            match outbox.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("Outbox of subscriber {id} is full, dropping {} event", event.kind());
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            debug!("Subscriber {id} went away, removing it");
            self.unsubscribe(id);
        }

        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total events discarded because a subscriber's outbox was full
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of a subscriber outbox.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once deregistered.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ServiceState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_in_order() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(Event::Reload), 2);
        assert_eq!(bus.publish(Event::status_changed("abc", ServiceState::Up)), 2);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await, Some(Event::Reload));
            assert_eq!(
                sub.recv().await,
                Some(Event::status_changed("abc", ServiceState::Up))
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(Event::Reload), 0);
        assert_eq!(bus.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_on_full_outboxes() {
        let bus = EventBus::new(1);
        let subs: Vec<Subscription> = (0..16).map(|_| bus.subscribe()).collect();

        // Fill every outbox.
        assert_eq!(bus.publish(Event::Reload), 16);

        let result = tokio::time::timeout(Duration::from_millis(100), async {
            bus.publish(Event::status_changed("x", ServiceState::Down))
        })
        .await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(bus.dropped_count(), 16);
        assert_eq!(bus.subscriber_count(), subs.len());
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_affect_others() {
        let bus = EventBus::new(1);
        let _stalled = bus.subscribe();
        let mut live = bus.subscribe();

        bus.publish(Event::Reload);
        assert_eq!(live.recv().await, Some(Event::Reload));

        assert_eq!(bus.publish(Event::status_changed("x", ServiceState::Up)), 1);
        assert_eq!(
            live.recv().await,
            Some(Event::status_changed("x", ServiceState::Up))
        );
        assert_eq!(bus.dropped_count(), 1);
    }

    #[test]
    fn test_repeated_subscribe_unsubscribe_leaves_no_entries() {
        let bus = EventBus::default();
        for _ in 0..100 {
            let sub = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);
            drop(sub);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_explicit_unsubscribe_then_drop() {
        let bus = EventBus::default();
        let keep = bus.subscribe();
        let sub = bus.subscribe();
        bus.unsubscribe(sub.id());
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_after_unsubscribe() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.unsubscribe(sub.id());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_unsubscribe() {
        let bus = EventBus::new(4);
        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    bus.publish(Event::Reload);
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            let sub = bus.subscribe();
            tokio::task::yield_now().await;
            drop(sub);
        }

        publisher.await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
