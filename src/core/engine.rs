//! # Engine: owns the event loops, the event bus and subscriber delivery.
//!
//! The [`Engine`] is the explicitly constructed process-level object behind every
//! [`Context`] and [`ContextRunner`]. It replaces any global runtime state: build one
//! at startup and pass it (or the handles it gives out) to whoever needs them.
//!
//! ## High-level architecture
//! ```text
//! EngineBuilder::build()
//!   ├─► Bus (broadcast, cfg.bus_capacity)
//!   ├─► plumbing runtime (1 worker, "{prefix}-events")
//!   │     ├─► subscriber listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   │     └─► subscriber workers (one per Subscribe)
//!   └─► ContextPool (cfg.pool_size loops, "{prefix}-{i}")
//!
//! Handles given out:
//!   context_runner()        ─► ContextRunner (fan-out/gather)
//!   get_or_create_context() ─► Context
//!   bus()                   ─► Bus
//!
//! Shutdown path:
//!   shutdown() / run_until_signal()
//!       └─► Bus.publish(ShutdownRequested)
//!       └─► pool.close()          → loops stop, queued jobs dropped
//!       └─► pool.join(cfg.grace):
//!              ├─ all joined      → Bus.publish(AllStoppedWithin)
//!              └─ grace exceeded  → Bus.publish(GraceExceeded), Err(GraceExceeded{stuck})
//!       └─► drain listener and subscriber workers (bounded by cfg.grace)
//! ```

use std::sync::Arc;

use tokio::{runtime::Runtime, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::core::{
    builder::EngineBuilder, config::Config, context::Context, pool::ContextPool,
    runner::ContextRunner, shutdown,
};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;

/// Event-loop engine.
///
/// # Example
/// ```
/// use ctxrunner::{Config, Engine};
///
/// let engine = Engine::new(Config { pool_size: 2, ..Config::default() }).unwrap();
/// let ctx = engine.get_or_create_context();
/// assert!(ctx.name().starts_with("ctx-loop-"));
/// engine.shutdown().unwrap();
/// ```
pub struct Engine {
    cfg: Config,
    bus: Bus,
    pool: Arc<ContextPool>,
    runner: ContextRunner,
    plumbing: Option<Runtime>,
    subs: Option<Arc<SubscriberSet>>,
    listener: Option<JoinHandle<()>>,
    events_token: CancellationToken,
}

impl Engine {
    /// Starts a builder for an engine with the given configuration.
    pub fn builder(cfg: Config) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    /// Builds an engine without subscribers.
    pub fn new(cfg: Config) -> Result<Self, RuntimeError> {
        EngineBuilder::new(cfg).build()
    }

    pub(crate) fn from_parts(
        cfg: Config,
        bus: Bus,
        pool: Arc<ContextPool>,
        plumbing: Runtime,
        subs: Option<Arc<SubscriberSet>>,
        listener: Option<JoinHandle<()>>,
        events_token: CancellationToken,
    ) -> Self {
        let runner = ContextRunner::new(
            Arc::clone(&pool),
            bus.clone(),
            cfg.default_blocking_timeout(),
        );
        Self {
            cfg,
            bus,
            pool,
            runner,
            plumbing: Some(plumbing),
            subs,
            listener,
            events_token,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Event bus carrying the engine's runtime events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Fan-out/gather runner backed by this engine's loops.
    pub fn context_runner(&self) -> ContextRunner {
        self.runner.clone()
    }

    /// Returns the caller's context when running on one of this engine's loops,
    /// otherwise the next pooled context.
    pub fn get_or_create_context(&self) -> Context {
        Context::current()
            .filter(|ctx| self.pool.owns(ctx))
            .unwrap_or_else(|| self.pool.acquire())
    }

    /// All event loops of this engine.
    pub fn contexts(&self) -> &[Context] {
        self.pool.contexts()
    }

    /// Stops the event loops and waits up to [`Config::grace`] for them to exit.
    ///
    /// Queued jobs are dropped; fan-out operations still in flight are abandoned
    /// (their handlers fire with [`RunnerError::Abandoned`](crate::RunnerError::Abandoned)).
    /// Must be called from outside the engine's loops.
    pub fn shutdown(mut self) -> Result<(), RuntimeError> {
        if Context::current().is_some() {
            return Err(RuntimeError::InvalidCallingContext);
        }
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.pool.close();

        let grace = self.cfg.grace;
        let stuck = self.pool.join(grace);
        let res = if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus
                .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
            Err(RuntimeError::GraceExceeded { grace, stuck })
        };

        self.drain_subscribers();
        res
    }

    /// Blocks until SIGINT/SIGTERM/SIGQUIT (Ctrl-C on other platforms), then shuts down.
    pub fn run_until_signal(self) -> Result<(), RuntimeError> {
        if Context::current().is_some() {
            return Err(RuntimeError::InvalidCallingContext);
        }
        if let Some(rt) = &self.plumbing {
            rt.block_on(shutdown::wait_for_shutdown_signal())
                .map_err(RuntimeError::Signal)?;
        }
        self.shutdown()
    }

    /// Lets the listener forward what is already on the bus, then closes subscriber queues.
    fn drain_subscribers(&mut self) {
        self.events_token.cancel();
        let Some(rt) = self.plumbing.take() else {
            return;
        };
        let listener = self.listener.take();
        let subs = self.subs.take();
        let grace = self.cfg.grace;

        rt.block_on(async move {
            if let Some(listener) = listener {
                let _ = listener.await;
            }
            if let Some(set) = subs.and_then(|s| Arc::try_unwrap(s).ok()) {
                if time::timeout(grace, set.shutdown()).await.is_err() {
                    tracing::warn!(?grace, "subscribers did not drain within grace");
                }
            }
        });
        rt.shutdown_background();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.pool.close();
        self.events_token.cancel();
        if let Some(rt) = self.plumbing.take() {
            rt.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine(pool_size: usize) -> Engine {
        Engine::new(Config {
            pool_size,
            grace: Duration::from_secs(5),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn get_or_create_context_prefers_current_loop() {
        let mut engine = Arc::new(engine(2));
        let outside = engine.get_or_create_context();
        assert!(!outside.is_current());

        let (tx, rx) = std::sync::mpsc::channel();
        let target = engine.contexts()[1].clone();
        let expected = target.clone();
        let shared = Arc::clone(&engine);
        target
            .submit(move || {
                let picked = shared.get_or_create_context();
                tx.send(picked.same_loop(&expected)).unwrap();
            })
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());

        // The job above releases its engine handle once it has run.
        let engine = loop {
            match Arc::try_unwrap(engine) {
                Ok(engine) => break engine,
                Err(shared) => {
                    std::thread::sleep(Duration::from_millis(1));
                    engine = shared;
                }
            }
        };
        engine.shutdown().unwrap();
    }

    #[test]
    fn shutdown_publishes_lifecycle_events() {
        let engine = engine(2);
        let mut rx = engine.bus().subscribe();
        engine.shutdown().unwrap();

        // Loops may still be announcing themselves when we subscribe.
        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .filter(|kind| *kind != EventKind::ContextStarted)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ShutdownRequested,
                EventKind::ContextStopped,
                EventKind::ContextStopped,
                EventKind::AllStoppedWithin,
            ]
        );
    }

    #[test]
    fn shutdown_from_a_loop_is_rejected() {
        let engine = Arc::new(std::sync::Mutex::new(Some(engine(1))));
        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = engine.lock().unwrap().as_ref().unwrap().get_or_create_context();
        let shared = Arc::clone(&engine);
        ctx.submit(move || {
            let taken = shared.lock().unwrap().take().unwrap();
            let res = taken.shutdown();
            tx.send(matches!(res, Err(RuntimeError::InvalidCallingContext)))
                .unwrap();
        })
        .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
