//! # Concurrency contexts.
//!
//! A [`Context`] is a cloneable handle to one event loop: an OS thread driving a
//! single-threaded tokio runtime. Work reaches the loop in two ways:
//!
//! - [`Context::submit`] queues a closure; closures run one at a time, in submission order;
//! - [`Context::spawn`] schedules a future on the loop's runtime; it is polled only on the
//!   loop thread, interleaved with queued closures.
//!
//! Loop threads are marked through a thread-local, so [`Context::current`] tells whether
//! the calling code runs on a managed loop (and which one).
//!
//! ```text
//!   submit(job) ──► [unbounded FIFO] ──► loop thread ──► job()
//!   spawn(fut)  ──► runtime handle   ──┘ (same thread, same runtime)
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;

/// Unit of work queued on an event loop.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

struct LoopHandle {
    pool: u64,
    id: usize,
    name: Arc<str>,
    jobs: mpsc::UnboundedSender<Job>,
    runtime: Handle,
    token: CancellationToken,
}

/// Handle to one event loop of an [`Engine`](crate::Engine).
///
/// Cheap to clone; all clones address the same loop.
#[derive(Clone)]
pub struct Context {
    inner: Arc<LoopHandle>,
}

impl Context {
    pub(crate) fn new(
        pool: u64,
        id: usize,
        name: Arc<str>,
        jobs: mpsc::UnboundedSender<Job>,
        runtime: Handle,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(LoopHandle {
                pool,
                id,
                name,
                jobs,
                runtime,
                token,
            }),
        }
    }

    /// Returns the context of the event loop running the caller, if any.
    ///
    /// # Example
    /// ```
    /// assert!(ctxrunner::Context::current().is_none());
    /// ```
    pub fn current() -> Option<Context> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Index of the loop inside its pool.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Loop name (also the thread name).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True when the caller runs on this loop.
    pub fn is_current(&self) -> bool {
        CURRENT.with(|c| c.borrow().as_ref().is_some_and(|cur| cur.same_loop(self)))
    }

    /// True once the owning pool started shutting down.
    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled() || self.inner.jobs.is_closed()
    }

    /// Queues `job` on this loop.
    ///
    /// Jobs run one at a time, in submission order. A panicking job is reported as
    /// `EventKind::ContextPanicked` and the loop moves on to the next job.
    ///
    /// Returns [`RunnerError::Closed`] if the loop is shut down (the job is dropped).
    pub fn submit<F>(&self, job: F) -> Result<(), RunnerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.token.is_cancelled() {
            return Err(RunnerError::Closed);
        }
        self.inner
            .jobs
            .send(Box::new(job))
            .map_err(|_| RunnerError::Closed)
    }

    /// Runs `fut` on this loop's runtime.
    ///
    /// The future is only ever polled on the loop thread. Futures still pending when the
    /// pool shuts down are dropped.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.runtime.spawn(fut)
    }

    pub(crate) fn same_loop(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.inner.pool
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Marks the calling thread as running this loop.
    pub(crate) fn enter(&self) {
        CURRENT.with(|c| *c.borrow_mut() = Some(self.clone()));
    }

    /// Clears the loop marker of the calling thread.
    pub(crate) fn leave() {
        CURRENT.with(|c| c.borrow_mut().take());
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
