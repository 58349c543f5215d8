// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic publish/subscribe registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    handlers: DashMap<u64, Handler<E>>,
}

/// A typed, synchronous event bus.
///
/// Handlers run on the publishing thread, in subscription order. Handlers
/// may subscribe or unsubscribe from inside a callback; the change applies
/// from the next publish.
pub struct EventBus<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                handlers: DashMap::new(),
            }),
        }
    }

    /// Registers `handler` until the returned [`Subscription`] is dropped or
    /// cancelled.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.handlers.insert(id, Arc::new(handler));
        trace!(subscription = id, "handler subscribed");

        let registry: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            id,
            remove: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.handlers.remove(&id);
                    trace!(subscription = id, "handler unsubscribed");
                }
            })),
        }
    }

    /// Delivers `event` to every current subscriber. Returns how many
    /// handlers saw it.
    pub fn publish(&self, event: &E) -> usize {
        let mut handlers: Vec<(u64, Handler<E>)> = self
            .registry
            .handlers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        // Shard iteration order is arbitrary.
        handlers.sort_unstable_by_key(|(id, _)| *id);
        for (_, handler) in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.len()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Subscribes a channel instead of a callback. Events are cloned into an
    /// unbounded queue; the subscription ends when the stream is dropped.
    pub fn stream(&self) -> EventStream<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        EventStream {
            rx,
            _subscription: subscription,
        }
    }
}

/// Handle for one registered handler. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unsubscribes now. Equivalent to dropping the handle.
    pub fn cancel(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// Receiving end of [`EventBus::stream`].
pub struct EventStream<E> {
    rx: mpsc::UnboundedReceiver<E>,
    _subscription: Subscription,
}

impl<E> EventStream<E> {
    /// Waits for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Returns an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = (0..5)
            .map(|n| {
                let seen = Arc::clone(&seen);
                bus.subscribe(move |e: &u32| seen.lock().unwrap().push((n, *e)))
            })
            .collect();
        assert_eq!(bus.publish(&7), 5);
        let order: Vec<_> = seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        drop(subs);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let bus = EventBus::<&'static str>::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&"a");
        drop(sub);
        assert_eq!(bus.publish(&"b"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn cancel_is_explicit_drop() {
        let bus = EventBus::<()>::new();
        let a = bus.subscribe(|_| {});
        let _b = bus.subscribe(|_| {});
        assert_ne!(a.id(), _b.id());
        a.cancel();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn subscription_outliving_the_bus_is_harmless() {
        let bus = EventBus::<u8>::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        drop(sub);
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let bus = EventBus::<u8>::new();
        let inner = bus.clone();
        let late = Arc::new(Mutex::new(Vec::new()));
        let late_ref = Arc::clone(&late);
        let _outer = bus.subscribe(move |_| {
            late_ref.lock().unwrap().push(inner.subscribe(|_| {}));
        });
        assert_eq!(bus.publish(&1), 1);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn stream_receives_clones_until_dropped() {
        let bus = EventBus::<String>::new();
        let mut stream = bus.stream();
        bus.publish(&"hello".to_string());
        assert_eq!(stream.recv().await.as_deref(), Some("hello"));
        assert!(stream.try_recv().is_none());
        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
