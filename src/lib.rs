//! # ctxrunner
//!
//! **ctxrunner** runs a producer on several event loops at once and gathers one
//! result from each instance.
//!
//! A *context* is a single-threaded event loop. A producer started on a context reports
//! its outcome through a [`Completion`]; the outcome travels back through the same
//! context before it reaches the per-operation collector, which fires the caller's
//! handler exactly once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!              caller thread (not an event loop)
//!                        │
//!                        ▼
//!           ContextRunner::execute(N, producer, on_done)
//!                        │  pool.acquire() × N (round-robin)
//!        ┌───────────────┼───────────────┐
//!        ▼               ▼               ▼
//!  ┌───────────┐   ┌───────────┐   ┌───────────┐
//!  │ ctx-loop-0│   │ ctx-loop-1│   │ ctx-loop-2│   one OS thread each,
//!  │ producer  │   │ producer  │   │ producer  │   FIFO job queue
//!  └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!        │ done.succeed(v) / done.fail(e)│
//!        │ (re-submitted on its own loop)│
//!        ▼               ▼               ▼
//! ┌───────────────────────────────────────────────┐
//! │ Collector (one mutex per operation)           │
//! │ - N values   ─► on_done(Ok(values))           │
//! │ - 1st error  ─► on_done(Err(Producer(e)))     │
//! │ - duplicates ─► discarded, warned             │
//! │ - dropped    ─► on_done(Err(Abandoned))       │
//! └───────────────────────────────────────────────┘
//!
//! every step publishes Event ──► Bus ──► listener ──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ### Blocking form
//! ```text
//! execute_blocking(N, producer, timeout)
//!   └─► execute(N, producer, |outcome| tx.send(outcome))
//!   └─► rx.recv_timeout(timeout)
//!          ├─ Ok(values)     ─► Ok(values)            (completion order)
//!          ├─ Err(Producer)  ─► Err(Producer(e))
//!          ├─ elapsed        ─► Err(Timeout)          (instances keep running)
//!          └─ disconnected   ─► Err(Interrupted)
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                 |
//! |-------------------|-----------------------------------------------------------------|------------------------------------|
//! | **Engine**        | Owns the event loops, event bus and subscriber delivery.        | [`Engine`], [`EngineBuilder`]      |
//! | **Contexts**      | Single-threaded event loops accepting jobs and futures.         | [`Context`]                        |
//! | **Fan-out**       | Replicate a producer over N loops and gather the results.       | [`ContextRunner`], [`Completion`]  |
//! | **Subscriber API**| Hook into loop and fan-out lifecycle events.                    | [`Subscribe`], [`Event`]           |
//! | **Errors**        | Typed errors for the engine and for fan-out operations.         | [`RunnerError`], [`RuntimeError`]  |
//! | **Configuration** | Pool size, grace period, default blocking timeout.              | [`Config`]                         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] that forwards events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ctxrunner::{Completion, Config, Context, Engine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { pool_size: 4, ..Config::default() };
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn ctxrunner::Subscribe>> = vec![Arc::new(ctxrunner::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn ctxrunner::Subscribe>> = Vec::new();
//!
//!     let engine = Engine::builder(cfg).with_subscribers(subs).build()?;
//!     let runner = engine.context_runner();
//!
//!     let loads = runner.execute_blocking(
//!         3,
//!         |ctx: &Context, done: Completion<usize>| {
//!             ctx.spawn(async move {
//!                 tokio::time::sleep(Duration::from_millis(5)).await;
//!                 done.succeed(done.instance() * 10);
//!             });
//!         },
//!         Duration::from_secs(5),
//!     )?;
//!     assert_eq!(loads.len(), 3);
//!
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{Completion, Config, Context, ContextRunner, Engine, EngineBuilder};
pub use error::{BoxError, RunnerError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
