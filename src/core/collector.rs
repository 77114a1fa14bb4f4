//! # Result collector for one fan-out operation.
//!
//! Accepts one outcome per instance and fires the caller's handler exactly once:
//! with the full list after the N-th success, or with the first error.
//!
//! ## Rules
//! - All state lives behind **one mutex per operation**; the handler runs inside the
//!   same critical section that recorded the last outcome.
//! - A second outcome for an instance is a protocol violation: it is discarded,
//!   logged and published as `ExtraResultDiscarded`. It never re-fires the handler.
//! - Outcomes arriving after the handler fired are dropped silently.
//! - Results are kept in arrival (completion) order.
//! - Dropping an armed collector fires the handler with [`RunnerError::Abandoned`].
//!
//! ```text
//! push_result(i, v) ─┐                      ┌─► received == N ─► handler(Ok(results))
//!                    ├─► lock ─► reported[i]?┤
//! push_error(i, e) ──┘          (dup: warn)  └─► first error  ─► handler(Err(e))
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::RunnerError;
use crate::events::{Bus, Event, EventKind};

/// Single-shot completion handler of a fan-out operation.
pub(crate) type DoneHandler<T> = Box<dyn FnOnce(Result<Vec<T>, RunnerError>) + Send + 'static>;

struct State<T> {
    results: Vec<T>,
    reported: Vec<bool>,
    received: usize,
    handler: Option<DoneHandler<T>>,
}

/// Aggregation state of one fan-out operation.
pub(crate) struct Collector<T> {
    op: u64,
    target: usize,
    bus: Bus,
    state: Mutex<State<T>>,
}

impl<T> Collector<T> {
    /// Creates a collector expecting `target` outcomes.
    pub(crate) fn new(op: u64, target: usize, bus: Bus, handler: DoneHandler<T>) -> Self {
        Self {
            op,
            target,
            bus,
            state: Mutex::new(State {
                results: Vec::with_capacity(target),
                reported: vec![false; target],
                received: 0,
                handler: Some(handler),
            }),
        }
    }

    /// Records a value reported by `instance`.
    pub(crate) fn push_result(&self, instance: usize, value: T) {
        let mut st = self.lock();
        if !Self::mark_reported(&mut st, instance) {
            self.discard(instance, "value");
            return;
        }
        if st.handler.is_none() {
            tracing::trace!(op = self.op, instance, "result after completion dropped");
            return;
        }

        st.results.push(value);
        st.received += 1;
        self.bus.publish(
            Event::new(EventKind::InstanceSucceeded)
                .with_op(self.op)
                .with_instance(instance),
        );

        if st.received == self.target {
            if let Some(handler) = st.handler.take() {
                let results = std::mem::take(&mut st.results);
                self.bus.publish(
                    Event::new(EventKind::FanOutCompleted)
                        .with_op(self.op)
                        .with_instances(self.target),
                );
                handler(Ok(results));
            }
        }
    }

    /// Records a failure reported by `instance`; the first one fails the operation.
    pub(crate) fn push_error(&self, instance: usize, err: RunnerError) {
        let mut st = self.lock();
        if !Self::mark_reported(&mut st, instance) {
            self.discard(instance, "error");
            return;
        }

        let reason = err.to_string();
        self.bus.publish(
            Event::new(EventKind::InstanceFailed)
                .with_op(self.op)
                .with_instance(instance)
                .with_reason(reason.as_str()),
        );

        match st.handler.take() {
            Some(handler) => {
                self.bus.publish(
                    Event::new(EventKind::FanOutFailed)
                        .with_op(self.op)
                        .with_instance(instance)
                        .with_reason(reason),
                );
                handler(Err(err));
            }
            None => {
                tracing::trace!(op = self.op, instance, "error after completion dropped");
            }
        }
    }

    /// Number of values collected so far.
    #[cfg(test)]
    pub(crate) fn received(&self) -> usize {
        self.lock().received
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // A handler panicking under the lock leaves the state consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if `instance` already reported an outcome.
    fn mark_reported(st: &mut State<T>, instance: usize) -> bool {
        match st.reported.get_mut(instance) {
            Some(seen) if !*seen => {
                *seen = true;
                true
            }
            _ => false,
        }
    }

    fn discard(&self, instance: usize, what: &str) {
        tracing::warn!(
            op = self.op,
            instance,
            "producer must supply one result, and only one result; extra {what} discarded"
        );
        self.bus.publish(
            Event::new(EventKind::ExtraResultDiscarded)
                .with_op(self.op)
                .with_instance(instance)
                .with_reason(format!("extra {what} from instance {instance}")),
        );
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = st.handler.take() {
            let err = RunnerError::Abandoned {
                received: st.received,
                expected: self.target,
            };
            self.bus.publish(
                Event::new(EventKind::FanOutAbandoned)
                    .with_op(self.op)
                    .with_instances(self.target)
                    .with_reason(err.to_string()),
            );
            handler(Err(err));
        }
    }
}
