//! # Fan-out/gather over event loops.
//!
//! [`ContextRunner`] replicates one producer across N contexts and gathers exactly one
//! outcome from each.
//!
//! ## Flow
//! ```text
//! execute(N, producer, on_done)
//!   ├─ on an event loop?  ──► Err(InvalidCallingContext)   (nothing scheduled)
//!   ├─ N == 0 / closed    ──► Err(NoInstances / Closed)
//!   └─ for i in 0..N:
//!        ctx = pool.acquire()
//!        ctx.submit(producer(&ctx, Completion{ctx, i}))
//!                                   │
//!              done.succeed(v) ─────┴──► ctx.submit(collector.push_result(i, v))
//!              done.fail(e)    ──────────► ctx.submit(collector.push_error(i, e))
//!
//! collector: N values ─► on_done(Ok(values in completion order))
//!            1st error ─► on_done(Err(Producer(e)))     (others keep running)
//! ```
//!
//! ## Rules
//! - `on_done` fires **exactly once** for every accepted operation.
//! - There is no cancellation: a failure or a blocking timeout stops result
//!   propagation, not execution.
//! - One collector (one mutex) per call; never shared between calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::core::{
    collector::Collector, completion::Completion, context::Context, pool::ContextPool,
};
use crate::error::RunnerError;
use crate::events::{Bus, Event, EventKind};

/// Global fan-out operation counter.
static OP_SEQ: AtomicU64 = AtomicU64::new(1);

/// Runs a producer on N event loops and gathers the results.
///
/// Obtained from [`Engine::context_runner`](crate::Engine::context_runner); cheap to clone.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ctxrunner::{Completion, Config, Context, Engine};
///
/// let engine = Engine::new(Config { pool_size: 2, ..Config::default() }).unwrap();
/// let runner = engine.context_runner();
///
/// let names = runner
///     .execute_blocking(
///         2,
///         |ctx: &Context, done: Completion<String>| done.succeed(ctx.name().to_string()),
///         Duration::from_secs(5),
///     )
///     .unwrap();
/// assert_eq!(names.len(), 2);
/// engine.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct ContextRunner {
    pool: Arc<ContextPool>,
    bus: Bus,
    default_timeout: Option<Duration>,
}

impl ContextRunner {
    pub(crate) fn new(
        pool: Arc<ContextPool>,
        bus: Bus,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            bus,
            default_timeout,
        }
    }

    /// Runs `producer` once on each of `instances` contexts and reports the gathered
    /// values (or the first failure) to `on_done`.
    ///
    /// Must be called from outside the engine's event loops. The returned `Err` covers
    /// only rejections raised before anything was scheduled; in that case `on_done` is
    /// dropped without being called. Otherwise `on_done` runs exactly once, on whichever
    /// loop delivered the deciding outcome.
    ///
    /// The value list is in completion order, not submission order.
    pub fn execute<T, P, H>(
        &self,
        instances: usize,
        producer: P,
        on_done: H,
    ) -> Result<(), RunnerError>
    where
        T: Send + 'static,
        P: Fn(&Context, Completion<T>) + Send + Sync + 'static,
        H: FnOnce(Result<Vec<T>, RunnerError>) + Send + 'static,
    {
        if Context::current().is_some() {
            return Err(self.reject(RunnerError::InvalidCallingContext));
        }
        if instances == 0 {
            return Err(self.reject(RunnerError::NoInstances));
        }
        if self.pool.is_closed() {
            return Err(self.reject(RunnerError::Closed));
        }

        let op = OP_SEQ.fetch_add(1, Ordering::Relaxed);
        let collector = Arc::new(Collector::new(
            op,
            instances,
            self.bus.clone(),
            Box::new(on_done),
        ));
        let producer = Arc::new(producer);
        self.bus.publish(
            Event::new(EventKind::FanOutStarted)
                .with_op(op)
                .with_instances(instances),
        );

        for instance in 0..instances {
            let ctx = self.pool.acquire();
            let done = Completion::new(ctx.clone(), Arc::clone(&collector), instance);
            let producer = Arc::clone(&producer);
            let run_on = ctx.clone();

            match ctx.submit(move || (*producer)(&run_on, done)) {
                Ok(()) => self.bus.publish(
                    Event::new(EventKind::InstanceSubmitted)
                        .with_op(op)
                        .with_instance(instance)
                        .with_context(ctx.name()),
                ),
                Err(err) => {
                    // Pool closed mid-way: fail the operation, skip the remaining instances.
                    collector.push_error(instance, err);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Blocking form of [`execute`](Self::execute): waits up to `timeout` for the
    /// gathered values.
    ///
    /// - producer failure → [`RunnerError::Producer`] carrying the producer's error;
    /// - deadline elapsed → [`RunnerError::Timeout`]; outstanding instances keep running
    ///   and their outcomes are discarded;
    /// - outcome channel closed without a value → [`RunnerError::Interrupted`].
    pub fn execute_blocking<T, P>(
        &self,
        instances: usize,
        producer: P,
        timeout: Duration,
    ) -> Result<Vec<T>, RunnerError>
    where
        T: Send + 'static,
        P: Fn(&Context, Completion<T>) + Send + Sync + 'static,
    {
        self.wait(instances, producer, Some(timeout))
    }

    /// [`execute_blocking`](Self::execute_blocking) with the engine's
    /// [`Config::blocking_timeout`](crate::Config::blocking_timeout) (`0` waits without a deadline).
    pub fn execute_blocking_default<T, P>(
        &self,
        instances: usize,
        producer: P,
    ) -> Result<Vec<T>, RunnerError>
    where
        T: Send + 'static,
        P: Fn(&Context, Completion<T>) + Send + Sync + 'static,
    {
        self.wait(instances, producer, self.default_timeout)
    }

    fn wait<T, P>(
        &self,
        instances: usize,
        producer: P,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>, RunnerError>
    where
        T: Send + 'static,
        P: Fn(&Context, Completion<T>) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.execute(instances, producer, move |outcome| {
            // The caller may have stopped waiting already.
            let _ = tx.send(outcome);
        })?;

        let received = match timeout {
            Some(limit) => rx.recv_timeout(limit),
            None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let timeout = timeout.unwrap_or_default();
                self.bus
                    .publish(Event::new(EventKind::BlockingTimedOut).with_timeout(timeout));
                Err(RunnerError::Timeout { timeout })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RunnerError::Interrupted),
        }
    }

    fn reject(&self, err: RunnerError) -> RunnerError {
        self.bus
            .publish(Event::new(EventKind::FanOutRejected).with_reason(err.as_label()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn runner(pool_size: usize) -> (ContextRunner, Arc<ContextPool>) {
        let cfg = Config {
            pool_size,
            thread_prefix: "runner-test".into(),
            ..Config::default()
        };
        let bus = Bus::new(256);
        let pool = Arc::new(ContextPool::new(&cfg, bus.clone()).unwrap());
        (ContextRunner::new(Arc::clone(&pool), bus, cfg.default_blocking_timeout()), pool)
    }

    #[test]
    fn single_instance_immediate_value() {
        let (runner, _pool) = runner(1);
        let started = std::time::Instant::now();
        let got = runner
            .execute_blocking(
                1,
                |_: &Context, done: Completion<&'static str>| done.succeed("x"),
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(got, vec!["x"]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn producer_runs_on_its_context_and_outcome_comes_back_there() {
        let (runner, _pool) = runner(3);
        let got = runner
            .execute_blocking(
                6,
                |ctx: &Context, done: Completion<bool>| {
                    let on_ctx = ctx.is_current() && done.context().same_loop(ctx);
                    // Reported from a foreign thread; delivery still goes through `ctx`.
                    thread::spawn(move || done.succeed(on_ctx));
                },
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(got, vec![true; 6]);
    }

    #[test]
    fn rejects_zero_instances() {
        let (runner, _pool) = runner(1);
        let err = runner
            .execute(0, |_: &Context, done: Completion<u8>| done.succeed(1), |_| {})
            .unwrap_err();
        assert!(matches!(err, RunnerError::NoInstances));
    }

    #[test]
    fn rejects_when_pool_closed() {
        let (runner, pool) = runner(1);
        pool.close();
        let err = runner
            .execute_blocking(
                1,
                |_: &Context, done: Completion<u8>| done.succeed(1),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::Closed));
    }

    #[test]
    fn dropped_completion_abandons_operation() {
        let (runner, _pool) = runner(2);
        let err = runner
            .execute_blocking(
                2,
                |_: &Context, _done: Completion<u8>| {},
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::Abandoned { received: 0, expected: 2 }));
    }

    #[test]
    fn handler_fires_once_on_failure() {
        let (runner, _pool) = runner(2);
        let fired = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let counter = Arc::clone(&fired);

        runner
            .execute(
                4,
                |_: &Context, done: Completion<u8>| {
                    if done.instance() % 2 == 0 {
                        done.fail("boom");
                    } else {
                        done.succeed(1);
                    }
                },
                move |outcome| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tx.send(outcome.map_err(|e| e.to_string())).unwrap();
                },
            )
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Err("boom".to_string())
        );
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
