//! # Per-instance completion handle.
//!
//! A [`Completion`] is handed to every producer invocation. Reporting through it
//! never touches the collector directly: the outcome is first re-submitted to the
//! context the producer was started on, and only that job feeds the collector.
//!
//! ```text
//! producer(ctx, done) ... done.succeed(v) ──► ctx.submit(push_result) ──► Collector
//!                         done.fail(e)    ──► ctx.submit(push_error)  ──┘
//! ```
//!
//! A producer must report exactly one outcome. Extra outcomes are discarded by the
//! collector; dropping every clone without reporting abandons the operation.

use std::fmt;
use std::sync::Arc;

use crate::core::{collector::Collector, context::Context};
use crate::error::{BoxError, RunnerError};

/// Single-result callback for one producer invocation.
pub struct Completion<T> {
    context: Context,
    collector: Arc<Collector<T>>,
    instance: usize,
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn new(context: Context, collector: Arc<Collector<T>>, instance: usize) -> Self {
        Self {
            context,
            collector,
            instance,
        }
    }

    /// Reports a value.
    pub fn succeed(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Reports a failure; the whole operation fails with it.
    pub fn fail(&self, err: impl Into<BoxError>) {
        self.complete(Err(err.into()));
    }

    /// Reports an outcome.
    ///
    /// If the originating context is already shut down the outcome is dropped.
    pub fn complete(&self, outcome: Result<T, BoxError>) {
        let collector = Arc::clone(&self.collector);
        let instance = self.instance;
        let delivered = self.context.submit(move || match outcome {
            Ok(value) => collector.push_result(instance, value),
            Err(err) => collector.push_error(instance, RunnerError::Producer(err)),
        });
        if delivered.is_err() {
            tracing::debug!(
                context = self.context.name(),
                instance,
                "context closed; outcome dropped"
            );
        }
    }
}

impl<T> Completion<T> {
    /// Context this instance was submitted to; outcomes are delivered back on it.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Index of this instance in submission order.
    pub fn instance(&self) -> usize {
        self.instance
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            collector: Arc::clone(&self.collector),
            instance: self.instance,
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("context", &self.context.name())
            .field("instance", &self.instance)
            .finish()
    }
}
