//! In-process event fan out.
//!
//! Subscribers register a bounded channel for an [`EventKind`] and receive
//! a clone of every event of that kind published afterwards. Registration
//! and publishing share one lock, so every subscriber observes publishes in
//! the same order.

use crate::{Event, EventKind};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Index of a subscriber in the list of its event kind.
///
/// Ids are only meaningful together with the kind they were issued for. An
/// id is reused once its subscriber unsubscribes.
pub type SlotId = usize;

type Slots = Vec<Option<mpsc::Sender<Event>>>;

/// A cheaply cloneable handle to a shared subscriber registry.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<HashMap<EventKind, Slots>>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<EventKind, Slots>> {
        // Registry mutations cannot leave it inconsistent, so a poisoned lock
        // is still safe to use.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `tx` for events of `kind`. The first empty slot is reused,
    /// otherwise a new slot is appended.
    pub fn subscribe(&self, kind: EventKind, tx: mpsc::Sender<Event>) -> SlotId {
        let mut registry = self.registry();
        let slots = registry.entry(kind).or_default();

        let slot_id = match slots.iter().position(Option::is_none) {
            Some(slot_id) => {
                slots[slot_id] = Some(tx);
                slot_id
            }
            None => {
                slots.push(Some(tx));
                slots.len() - 1
            }
        };

        debug!(%kind, slot_id, "subscribed");
        slot_id
    }

    /// Empty the slot. Ids of other subscribers are unaffected. Unknown ids
    /// are ignored.
    pub fn unsubscribe(&self, kind: EventKind, slot_id: SlotId) {
        let mut registry = self.registry();
        if let Some(slot) = registry.get_mut(&kind).and_then(|s| s.get_mut(slot_id)) {
            if slot.take().is_some() {
                debug!(%kind, slot_id, "unsubscribed");
            }
        }
    }

    /// Deliver `event` to every subscriber of its kind, returning the number
    /// of channels it was delivered to.
    ///
    /// Delivery never waits. If a subscriber's channel is full the event is
    /// dropped for that subscriber only. Subscribers whose receiver is gone
    /// are skipped.
    pub fn publish(&self, event: &Event) -> usize {
        let kind = event.kind();
        let registry = self.registry();
        let Some(slots) = registry.get(&kind) else {
            trace!(%kind, "no subscribers");
            return 0;
        };

        let mut delivered = 0;
        for (slot_id, tx) in slots.iter().enumerate() {
            let Some(tx) = tx else { continue };
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    crate::metrics::record_dropped(kind.as_str());
                    warn!(
                        %kind,
                        slot_id,
                        event_id = %event.id,
                        "subscriber channel full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(%kind, slot_id, "subscriber channel closed");
                }
            }
        }
        drop(registry);

        crate::metrics::record_published(kind.as_str(), delivered);
        delivered
    }

    /// Create a channel with room for `capacity` events, subscribe it, and
    /// return the receiver with a guard that unsubscribes when dropped.
    /// A capacity of zero is raised to one.
    pub fn subscription(
        &self,
        kind: EventKind,
        capacity: usize,
    ) -> (Subscription, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let slot_id = self.subscribe(kind, tx);
        (
            Subscription {
                bus: self.clone(),
                kind,
                slot_id,
            },
            rx,
        )
    }

    /// Number of occupied slots for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry()
            .get(&kind)
            .map(|slots| slots.iter().flatten().count())
            .unwrap_or_default()
    }
}

/// A registered subscriber. Unsubscribes on drop, which closes the paired
/// receiver once it is drained.
#[derive(Debug)]
pub struct Subscription {
    bus: EventBus,
    kind: EventKind,
    slot_id: SlotId,
}

impl Subscription {
    /// The slot this subscription occupies.
    pub const fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// The event kind subscribed to.
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.kind, self.slot_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{EventPayload, MessageKind, NewMessage};

    fn message(text: &str) -> Event {
        Event::new(EventPayload::NewMessage(NewMessage {
            id: String::new(),
            sender_id: 1,
            message_kind: MessageKind::UserText,
            message: text.to_owned(),
            created_at: 0,
            updated_at: 0,
        }))
    }

    fn text(event: &Event) -> &str {
        let EventPayload::NewMessage(msg) = &event.payload;
        &msg.message
    }

    #[test]
    fn slots_are_reused() {
        let bus = EventBus::new();
        let kind = EventKind::NewMessage;
        let chan = || mpsc::channel(1).0;

        assert_eq!(bus.subscribe(kind, chan()), 0);
        assert_eq!(bus.subscribe(kind, chan()), 1);
        assert_eq!(bus.subscribe(kind, chan()), 2);

        bus.unsubscribe(kind, 1);
        assert_eq!(bus.subscriber_count(kind), 2);
        assert_eq!(bus.subscribe(kind, chan()), 1);
        assert_eq!(bus.subscribe(kind, chan()), 3);

        // unknown ids are ignored
        bus.unsubscribe(kind, 40);
        assert_eq!(bus.subscriber_count(kind), 4);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_in_order() {
        let bus = EventBus::new();
        let (_a, mut rx_a) = bus.subscription(EventKind::NewMessage, 4);
        let (_b, mut rx_b) = bus.subscription(EventKind::NewMessage, 4);

        assert_eq!(bus.publish(&message("one")), 2);
        assert_eq!(bus.publish(&message("two")), 2);

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(text(&rx.recv().await.unwrap()), "one");
            assert_eq!(text(&rx.recv().await.unwrap()), "two");
        }
    }

    #[tokio::test]
    async fn full_subscriber_drops_without_blocking_others() {
        let bus = EventBus::new();
        let (_slow, mut slow_rx) = bus.subscription(EventKind::NewMessage, 1);
        let (_fast, mut fast_rx) = bus.subscription(EventKind::NewMessage, 8);

        assert_eq!(bus.publish(&message("one")), 2);
        assert_eq!(bus.publish(&message("two")), 1);

        assert_eq!(text(&slow_rx.recv().await.unwrap()), "one");
        assert!(slow_rx.try_recv().is_err());

        assert_eq!(text(&fast_rx.recv().await.unwrap()), "one");
        assert_eq!(text(&fast_rx.recv().await.unwrap()), "two");
    }

    #[test]
    fn closed_receivers_are_skipped() {
        let bus = EventBus::new();
        let (_sub, rx) = bus.subscription(EventKind::NewMessage, 1);
        drop(rx);
        assert_eq!(bus.publish(&message("lost")), 0);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let (sub, mut rx) = bus.subscription(EventKind::NewMessage, 1);
        assert_eq!(sub.slot_id(), 0);
        assert_eq!(bus.subscriber_count(EventKind::NewMessage), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(EventKind::NewMessage), 0);
        assert_eq!(bus.publish(&message("late")), 0);
        assert!(rx.recv().await.is_none());
    }
}
