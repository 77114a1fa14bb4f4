//! # Engine configuration.
//!
//! Provides [`Config`] centralized settings for the engine and its context runner.
//!
//! Config is built once by the caller and handed to [`Engine::builder`](crate::Engine::builder);
//! there is no process-wide configuration state.
//!
//! ## Sentinel values
//! - `pool_size = 0` → `2 × available_parallelism` event loops
//! - `blocking_timeout = 0s` → blocking calls wait without a deadline

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

/// Global configuration for the engine.
///
/// ## Field semantics
/// - `pool_size`: Number of event loops (`0` = twice the available parallelism)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `grace`: Maximum wait for loops to stop during shutdown
/// - `blocking_timeout`: Default deadline for [`execute_blocking_default`](crate::ContextRunner::execute_blocking_default)
/// - `thread_prefix`: Prefix for loop thread names (`{prefix}-{index}`)
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of event loops backing the context pool.
    pub pool_size: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// skip older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Maximum time to wait for event loops to stop during shutdown.
    pub grace: Duration,

    /// Default deadline for blocking fan-out calls.
    ///
    /// - `Duration::ZERO` = wait until the operation completes
    /// - `> 0` = deadline applied per call
    pub blocking_timeout: Duration,

    /// Prefix used to name event loop threads.
    pub thread_prefix: Cow<'static, str>,
}

impl Config {
    /// Returns the number of event loops to start.
    ///
    /// Falls back to `2 × available_parallelism` (or 2 when that is unknown).
    #[inline]
    pub fn pool_size_resolved(&self) -> usize {
        match self.pool_size {
            0 => thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(2),
            n => n,
        }
    }

    /// Returns the default blocking deadline as an `Option`.
    ///
    /// - `None` → no deadline
    /// - `Some(d)` → deadline applied per call
    #[inline]
    pub fn default_blocking_timeout(&self) -> Option<Duration> {
        if self.blocking_timeout == Duration::ZERO {
            None
        } else {
            Some(self.blocking_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `pool_size = 0` (twice the available parallelism)
    /// - `bus_capacity = 1024`
    /// - `grace = 10s`
    /// - `blocking_timeout = 120s`
    /// - `thread_prefix = "ctx-loop"`
    fn default() -> Self {
        Self {
            pool_size: 0,
            bus_capacity: 1024,
            grace: Duration::from_secs(10),
            blocking_timeout: Duration::from_secs(120),
            thread_prefix: Cow::Borrowed("ctx-loop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_resolve() {
        let mut cfg = Config::default();
        assert!(cfg.pool_size_resolved() >= 2);
        assert_eq!(cfg.default_blocking_timeout(), Some(Duration::from_secs(120)));

        cfg.pool_size = 3;
        cfg.blocking_timeout = Duration::ZERO;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.pool_size_resolved(), 3);
        assert_eq!(cfg.default_blocking_timeout(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
