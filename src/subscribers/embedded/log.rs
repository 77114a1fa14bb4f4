//! # LogWriter: `tracing` event renderer
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`
//! (target `ctxrunner::events`). Install any `tracing` subscriber to see them.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! DEBUG ctxrunner::events: fan-out started op=4 instances=3
//! DEBUG ctxrunner::events: instance submitted op=4 instance=0 context="ctx-loop-2"
//!  WARN ctxrunner::events: extra result discarded op=4 instance=1 reason="..."
//!  INFO ctxrunner::events: fan-out completed op=4 instances=3
//!  WARN ctxrunner::events: blocking caller timed out timeout_ms=50
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let context = e.context.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ContextStarted => {
                tracing::debug!(target: "ctxrunner::events", context, "event loop started");
            }
            EventKind::ContextStopped => {
                tracing::debug!(target: "ctxrunner::events", context, "event loop stopped");
            }
            EventKind::ContextPanicked => {
                tracing::error!(target: "ctxrunner::events", context, reason, "job panicked on event loop");
            }
            EventKind::FanOutStarted => {
                tracing::debug!(target: "ctxrunner::events", op = ?e.op, instances = ?e.instances, "fan-out started");
            }
            EventKind::FanOutRejected => {
                tracing::warn!(target: "ctxrunner::events", reason, "fan-out rejected");
            }
            EventKind::InstanceSubmitted => {
                tracing::debug!(target: "ctxrunner::events", op = ?e.op, instance = ?e.instance, context, "instance submitted");
            }
            EventKind::InstanceSucceeded => {
                tracing::trace!(target: "ctxrunner::events", op = ?e.op, instance = ?e.instance, "instance succeeded");
            }
            EventKind::InstanceFailed => {
                tracing::debug!(target: "ctxrunner::events", op = ?e.op, instance = ?e.instance, reason, "instance failed");
            }
            EventKind::ExtraResultDiscarded => {
                tracing::warn!(target: "ctxrunner::events", op = ?e.op, instance = ?e.instance, reason, "extra result discarded");
            }
            EventKind::FanOutCompleted => {
                tracing::info!(target: "ctxrunner::events", op = ?e.op, instances = ?e.instances, "fan-out completed");
            }
            EventKind::FanOutFailed => {
                tracing::warn!(target: "ctxrunner::events", op = ?e.op, instance = ?e.instance, reason, "fan-out failed");
            }
            EventKind::FanOutAbandoned => {
                tracing::warn!(target: "ctxrunner::events", op = ?e.op, reason, "fan-out abandoned");
            }
            EventKind::BlockingTimedOut => {
                tracing::warn!(target: "ctxrunner::events", timeout_ms = ?e.timeout_ms, "blocking caller timed out");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "ctxrunner::events", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!(target: "ctxrunner::events", "all event loops stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::error!(target: "ctxrunner::events", stuck = reason, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "ctxrunner::events", subscriber = ?e.subscriber, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "ctxrunner::events", subscriber = ?e.subscriber, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
