//! Error types used by the engine and the context runner.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: errors raised by the engine itself (loops, shutdown, signals).
//! - [`RunnerError`]: errors raised by one fan-out operation.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// Boxed error type reported by producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the engine.
///
/// These represent failures in the execution engine itself,
/// such as a shutdown sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An event loop thread or the internal plumbing runtime could not be created.
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Shutdown was requested from one of the engine's own event loops.
    #[error("engine cannot be shut down from one of its own event loops")]
    InvalidCallingContext,

    /// Shutdown grace period was exceeded; some loops were still busy.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of loops that did not stop in time.
        stuck: Vec<String>,
    },

    /// OS signal listeners could not be registered.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ctxrunner::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Spawn(_) => "runtime_spawn_failed",
            RuntimeError::InvalidCallingContext => "runtime_invalid_calling_context",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Spawn(e) => format!("spawn failed: {e}"),
            RuntimeError::InvalidCallingContext => "shutdown called on an event loop".to_string(),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck loops={stuck:?}")
            }
            RuntimeError::Signal(e) => format!("signal registration failed: {e}"),
        }
    }
}

/// # Errors produced by a fan-out operation.
///
/// `InvalidCallingContext`, `NoInstances` and `Closed` are returned synchronously by
/// [`ContextRunner::execute`](crate::ContextRunner::execute) before anything is scheduled.
/// The remaining variants reach the caller through the completion handler
/// (or as the return value of the blocking form).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Fan-out was requested from inside a managed event loop.
    #[error("invalid calling context: already on an event loop")]
    InvalidCallingContext,

    /// Fan-out was requested with zero instances.
    #[error("instance count must be at least 1")]
    NoInstances,

    /// One producer invocation failed; carries the producer's own error.
    #[error(transparent)]
    Producer(BoxError),

    /// The blocking wait elapsed before every instance produced a result.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The blocking wait ended without an outcome being delivered.
    #[error("interrupted while waiting for results")]
    Interrupted,

    /// Every completion handle was dropped before the operation finished.
    #[error("operation abandoned with {received}/{expected} results")]
    Abandoned {
        /// Results collected before the operation was abandoned.
        received: usize,
        /// Instance count of the operation.
        expected: usize,
    },

    /// The context pool is shut down.
    #[error("context pool closed")]
    Closed,
}

impl RunnerError {
    /// Wraps a producer failure.
    pub fn producer(err: impl Into<BoxError>) -> Self {
        RunnerError::Producer(err.into())
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ctxrunner::RunnerError;
    /// use std::time::Duration;
    ///
    /// let err = RunnerError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "runner_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunnerError::InvalidCallingContext => "runner_invalid_calling_context",
            RunnerError::NoInstances => "runner_no_instances",
            RunnerError::Producer(_) => "runner_producer_failed",
            RunnerError::Timeout { .. } => "runner_timeout",
            RunnerError::Interrupted => "runner_interrupted",
            RunnerError::Abandoned { .. } => "runner_abandoned",
            RunnerError::Closed => "runner_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunnerError::InvalidCallingContext => "called from an event loop".to_string(),
            RunnerError::NoInstances => "zero instances requested".to_string(),
            RunnerError::Producer(e) => format!("producer: {e}"),
            RunnerError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            RunnerError::Interrupted => "interrupted".to_string(),
            RunnerError::Abandoned { received, expected } => {
                format!("abandoned: {received}/{expected}")
            }
            RunnerError::Closed => "pool closed".to_string(),
        }
    }

    /// Returns the producer's error, if this is a producer failure.
    pub fn producer_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            RunnerError::Producer(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Indicates whether the error was raised before any work was scheduled.
    ///
    /// # Example
    /// ```
    /// use ctxrunner::RunnerError;
    ///
    /// assert!(RunnerError::InvalidCallingContext.is_rejection());
    /// assert!(!RunnerError::Interrupted.is_rejection());
    /// ```
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RunnerError::InvalidCallingContext | RunnerError::NoInstances | RunnerError::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_error_displays_transparently() {
        let err = RunnerError::producer("disk on fire");
        assert_eq!(err.to_string(), "disk on fire");
        assert_eq!(
            err.producer_error().map(|e| e.to_string()).as_deref(),
            Some("disk on fire")
        );
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(RunnerError::Closed.as_label(), "runner_closed");
        assert_eq!(
            RunnerError::Abandoned { received: 1, expected: 3 }.as_message(),
            "abandoned: 1/3"
        );
        assert_eq!(
            RuntimeError::InvalidCallingContext.as_label(),
            "runtime_invalid_calling_context"
        );
    }
}
