use std::sync::Arc;

use tokio::{runtime, sync::broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;

use super::{config::Config, engine::Engine, pool::ContextPool};
use crate::{
    error::RuntimeError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Engine`] with optional subscribers.
pub struct EngineBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (loop lifecycle, fan-out progress, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds a single subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the engine and starts its event loops.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - event bus for broadcasting
    /// - plumbing runtime with the subscriber listener and workers
    /// - the pool of event loops
    ///
    /// Subscribers are attached before the first loop starts, so they observe every
    /// `ContextStarted` event.
    pub fn build(self) -> Result<Engine, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let plumbing = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("{}-events", self.cfg.thread_prefix))
            .enable_all()
            .build()
            .map_err(RuntimeError::Spawn)?;
        let events_token = CancellationToken::new();

        let (subs, listener) = if self.subscribers.is_empty() {
            (None, None)
        } else {
            let set = Arc::new(SubscriberSet::new(
                self.subscribers,
                bus.clone(),
                plumbing.handle(),
            ));
            let mut rx = bus.subscribe();
            let forward = Arc::clone(&set);
            let token = events_token.clone();

            let listener = plumbing.spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        ev = rx.recv() => match ev {
                            Ok(ev) => forward.emit(&ev),
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                            }
                            Err(RecvError::Closed) => break,
                        },
                        _ = token.cancelled() => break,
                    }
                }
            });
            (Some(set), Some(listener))
        };

        let pool = match ContextPool::new(&self.cfg, bus.clone()) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                events_token.cancel();
                plumbing.shutdown_background();
                return Err(e);
            }
        };

        Ok(Engine::from_parts(
            self.cfg,
            bus,
            pool,
            plumbing,
            subs,
            listener,
            events_token,
        ))
    }
}
