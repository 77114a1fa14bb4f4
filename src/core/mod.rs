//! Runtime core: event loops, fan-out/gather and engine lifecycle.
//!
//! Public surface of this module is re-exported from the crate root:
//! [`Engine`], [`EngineBuilder`], [`Config`], [`Context`], [`ContextRunner`], [`Completion`].
//!
//! Internal modules:
//! - [`pool`]: owns the loop threads and hands out contexts round-robin;
//! - [`collector`]: per-operation aggregation under one lock;
//! - [`runner`]: fan-out, blocking wait, rejection rules;
//! - [`shutdown`]: termination signal handling.

mod builder;
mod collector;
mod completion;
mod config;
mod context;
mod engine;
mod pool;
mod runner;
mod shutdown;

pub use builder::EngineBuilder;
pub use completion::Completion;
pub use config::Config;
pub use context::Context;
pub use engine::Engine;
pub use runner::ContextRunner;
