//! # Per-subscriber delivery queues.
//!
//! [`SubscriberSet`] hands every event to each registered [`Subscribe`] through its own
//! bounded queue and worker task. The caller of [`SubscriberSet::emit`] never waits on a
//! subscriber: a full queue loses the event for that subscriber alone.
//!
//! ```text
//! emit(&Event) ─► Arc<Event> ─┬─► queue "metrics" (cap 1024) ─► worker ─► on_event()
//!                             ├─► queue "log"     (cap 64)   ─► worker ─► on_event()
//!                             └─► full/closed ─► Bus.publish(SubscriberOverflow{name, reason})
//!
//! worker: panic in on_event() ─► Bus.publish(SubscriberPanicked{name, message}), next event
//! ```
//!
//! Each subscriber sees events in emit order; there is no ordering across subscribers.
//! Overflow reports are never themselves reported as overflow.
//!
//! Workers run on the runtime behind the [`Handle`] given to [`SubscriberSet::new`]; the
//! engine passes its plumbing runtime so no subscriber ever runs on an event loop.
//! Panics are caught with `AssertUnwindSafe`: a subscriber that panics while holding its
//! own lock may leave that state poisoned.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Queue {
    subscriber: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Registered subscribers with their delivery queues.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Registers `subs` and starts one worker per subscriber on `handle`.
    ///
    /// Queue capacity comes from [`Subscribe::queue_capacity`], at least 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus, handle: &Handle) -> Self {
        let (queues, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let queue = Queue {
                    subscriber: sub.name(),
                    tx,
                };
                (queue, handle.spawn(deliver(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// True when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues a shared event for every subscriber without waiting.
    ///
    /// A subscriber whose queue is full (or whose worker is gone) misses the event and a
    /// `SubscriberOverflow` with reason `"full"` or `"closed"` is published.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let reportable = !event.is_subscriber_overflow();

        for queue in &self.queues {
            let reason = match queue.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::debug!(subscriber = queue.subscriber, reason, "event not queued");
            if reportable {
                self.bus
                    .publish(Event::subscriber_overflow(queue.subscriber, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to finish what is already queued.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Worker body: feeds queued events to `sub` one at a time.
async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let outcome = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            tracing::error!(subscriber = sub.name(), panic = %message, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), message));
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("subscriber exploded");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_reports_panics() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let subs: Vec<Arc<dyn Subscribe>> = vec![rec.clone(), Arc::new(Panicky)];
        let set = SubscriberSet::new(subs, bus.clone(), &Handle::current());
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::FanOutStarted));
        set.emit(&Event::new(EventKind::FanOutCompleted));
        set.shutdown().await;

        assert_eq!(
            *rec.0.lock().unwrap(),
            vec![EventKind::FanOutStarted, EventKind::FanOutCompleted]
        );

        let ev = rx.recv().await.expect("panic event");
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.subscriber.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber exploded"));
    }

    #[test]
    fn panic_message_handles_unknown_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
