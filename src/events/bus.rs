//! # Runtime event bus.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] channel. Anything holding a clone can
//! publish from any thread, with or without a tokio runtime: loop threads, collectors
//! running on them, caller threads blocked in `execute_blocking` and the engine itself.
//!
//! ```text
//! loop threads ──┐
//! collectors ────┼─► Bus ─┬─► engine listener ─► SubscriberSet
//! runner/engine ─┘        └─► Bus::subscribe()  (ad-hoc receivers, tests)
//! ```
//!
//! Publishing never blocks and never fails. Events published while nobody is subscribed
//! are gone; a receiver that falls more than the capacity behind gets
//! `RecvError::Lagged` and resumes from the oldest retained event.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing handle for [`Event`]s.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` events per receiver (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Broadcasts `ev`; dropped silently when there are no receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Returns an independent receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_published_after_subscribe() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::FanOutStarted));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::FanOutCompleted).with_op(3));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::FanOutCompleted);
        assert_eq!(ev.op, Some(3));
        assert!(rx.try_recv().is_err());
    }
}
