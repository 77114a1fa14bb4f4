//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the engine, its event loops,
//! the context runner and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Engine` (shutdown), `ContextPool` loops (start/stop/panic),
//!   `ContextRunner` and its collectors (fan-out lifecycle), `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumers**: the engine's subscriber listener (fans out to `SubscriberSet`),
//!   or anyone holding [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
