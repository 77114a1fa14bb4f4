//! # Runtime events emitted by the engine, its event loops and the context runner.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Loop events**: event loop lifecycle (started, stopped, job panicked)
//! - **Fan-out events**: one operation's flow (started, per-instance outcomes, final outcome)
//! - **Shutdown events**: engine shutdown progress
//! - **Subscriber events**: health of user subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, operation id,
//! instance index, context name and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use ctxrunner::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::InstanceFailed)
//!     .with_op(7)
//!     .with_instance(2)
//!     .with_context("ctx-loop-1")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::InstanceFailed);
//! assert_eq!(ev.op, Some(7));
//! assert_eq!(ev.context.as_deref(), Some("ctx-loop-1"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Engine shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// All event loops stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some loops did not stop in time.
    ///
    /// Sets:
    /// - `reason`: names of stuck loops
    GraceExceeded,

    // === Event loop events ===
    /// An event loop thread started.
    ///
    /// Sets:
    /// - `context`: loop name
    ContextStarted,

    /// An event loop thread left its job loop.
    ///
    /// Sets:
    /// - `context`: loop name
    ContextStopped,

    /// A job submitted to an event loop panicked; the loop keeps running.
    ///
    /// Sets:
    /// - `context`: loop name
    /// - `reason`: panic info/message
    ContextPanicked,

    // === Fan-out events ===
    /// A fan-out operation was accepted.
    ///
    /// Sets:
    /// - `op`: operation id
    /// - `instances`: requested instance count
    FanOutStarted,

    /// A fan-out request was rejected before scheduling.
    ///
    /// Sets:
    /// - `reason`: rejection reason
    FanOutRejected,

    /// A producer invocation was submitted to a context.
    ///
    /// Sets:
    /// - `op`, `instance`, `context`
    InstanceSubmitted,

    /// A producer invocation reported a value.
    ///
    /// Sets:
    /// - `op`, `instance`
    InstanceSucceeded,

    /// A producer invocation reported an error.
    ///
    /// Sets:
    /// - `op`, `instance`, `reason`
    InstanceFailed,

    /// A producer reported more than one outcome; the extra one was discarded.
    ///
    /// Sets:
    /// - `op`, `instance`, `reason`
    ExtraResultDiscarded,

    /// All instances succeeded; the handler received the aggregated list.
    ///
    /// Sets:
    /// - `op`, `instances`
    FanOutCompleted,

    /// The handler received the first failure.
    ///
    /// Sets:
    /// - `op`, `instance` (if a producer failed), `reason`
    FanOutFailed,

    /// Every completion was dropped before the target count was reached.
    ///
    /// Sets:
    /// - `op`, `instances`, `reason`
    FanOutAbandoned,

    /// A blocking caller stopped waiting (outstanding work keeps running).
    ///
    /// Sets:
    /// - `timeout_ms`: elapsed deadline (ms)
    BlockingTimedOut,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Fan-out operation id.
    pub op: Option<u64>,
    /// Instance index within the operation (0-based, submission order).
    pub instance: Option<u32>,
    /// Instance count of the operation.
    pub instances: Option<u32>,
    /// Event loop name.
    pub context: Option<Arc<str>>,
    /// Subscriber name (subscriber events only).
    pub subscriber: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Deadline in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            op: None,
            instance: None,
            instances: None,
            context: None,
            subscriber: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches a fan-out operation id.
    #[inline]
    pub fn with_op(mut self, op: u64) -> Self {
        self.op = Some(op);
        self
    }

    /// Attaches an instance index.
    #[inline]
    pub fn with_instance(mut self, instance: usize) -> Self {
        self.instance = Some(clamp_u32(instance));
        self
    }

    /// Attaches an instance count.
    #[inline]
    pub fn with_instances(mut self, instances: usize) -> Self {
        self.instances = Some(clamp_u32(instances));
        self
    }

    /// Attaches an event loop name.
    #[inline]
    pub fn with_context(mut self, context: impl Into<Arc<str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a deadline (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber.into());
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber.into());
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }

    /// True for the events that end a fan-out operation.
    #[inline]
    pub fn is_fan_out_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::FanOutCompleted | EventKind::FanOutFailed | EventKind::FanOutAbandoned
        )
    }
}

fn clamp_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
