//! # Subscriber extension point.
//!
//! Implement [`Subscribe`] to observe what the engine does: loops starting and
//! stopping, fan-out operations being accepted, completing, failing or abandoned.
//! Register implementations with [`EngineBuilder::with_subscriber`](crate::EngineBuilder::with_subscriber).
//!
//! Delivery goes through [`SubscriberSet`](crate::SubscriberSet): one bounded queue and
//! one worker per subscriber, on the engine's plumbing runtime. A subscriber that falls
//! behind loses events (reported as `SubscriberOverflow`); one that panics is reported as
//! `SubscriberPanicked` and keeps receiving later events.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use ctxrunner::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct AbandonCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for AbandonCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::FanOutAbandoned {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "abandoned"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for engine observability.
///
/// Implementations share one plumbing worker thread with every other subscriber, so
/// `on_event` should not block. Errors are the subscriber's own business; panics are
/// caught but still cost the event.
/// - Do not call [`ContextRunner::execute_blocking`](crate::ContextRunner::execute_blocking)
///   from `on_event`: it would park the plumbing worker that delivers events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Calls never overlap and follow publish order.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs and overflow/panic events.
    ///
    /// Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    ///
    /// The engine clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
