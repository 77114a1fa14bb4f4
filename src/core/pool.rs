//! # Event loop pool.
//!
//! [`ContextPool`] owns the event loop threads behind every [`Context`].
//!
//! ## Architecture
//! ```text
//! ContextPool::new(cfg)
//!   ├─► loop 0: thread "{prefix}-0" ── current_thread runtime ── job queue
//!   ├─► loop 1: thread "{prefix}-1" ── current_thread runtime ── job queue
//!   └─► loop N-1 ...
//!
//! acquire() ──► round-robin over loops
//! close()   ──► cancel token: every loop stops taking jobs, queued jobs are dropped
//! join(g)   ──► wait up to `g` for loop threads; names of the ones still running
//! ```
//!
//! ## Rules
//! - Each loop executes queued jobs sequentially (FIFO) on its own thread.
//! - Spawned futures are dropped together with the loop's runtime.
//! - Publishes `ContextStarted` / `ContextStopped` / `ContextPanicked`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::{runtime, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::core::{config::Config, context::Context, context::Job};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;

static POOL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Polling step used while waiting for loop threads to exit.
const JOIN_POLL: Duration = Duration::from_millis(5);

struct LoopThread {
    name: Arc<str>,
    handle: thread::JoinHandle<()>,
}

/// Fixed set of event loops handing out [`Context`]s round-robin.
pub(crate) struct ContextPool {
    id: u64,
    contexts: Vec<Context>,
    next: AtomicUsize,
    threads: Mutex<Vec<LoopThread>>,
    token: CancellationToken,
}

impl ContextPool {
    /// Starts `cfg.pool_size_resolved()` event loops.
    ///
    /// If any loop fails to start, the loops already running are stopped and
    /// [`RuntimeError::Spawn`] is returned.
    pub(crate) fn new(cfg: &Config, bus: Bus) -> Result<Self, RuntimeError> {
        let id = POOL_SEQ.fetch_add(1, Ordering::Relaxed);
        let size = cfg.pool_size_resolved();
        let token = CancellationToken::new();
        let mut contexts = Vec::with_capacity(size);
        let mut threads = Vec::with_capacity(size);

        for index in 0..size {
            let name: Arc<str> = format!("{}-{index}", cfg.thread_prefix).into();
            match spawn_loop(id, index, Arc::clone(&name), token.clone(), bus.clone()) {
                Ok((ctx, handle)) => {
                    contexts.push(ctx);
                    threads.push(LoopThread { name, handle });
                }
                Err(e) => {
                    token.cancel();
                    return Err(RuntimeError::Spawn(e));
                }
            }
        }

        Ok(Self {
            id,
            contexts,
            next: AtomicUsize::new(0),
            threads: Mutex::new(threads),
            token,
        })
    }

    /// Returns the next loop in round-robin order.
    pub(crate) fn acquire(&self) -> Context {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        self.contexts[n % self.contexts.len()].clone()
    }

    /// All loops of this pool, indexed by [`Context::id`].
    pub(crate) fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// True if `ctx` belongs to this pool.
    pub(crate) fn owns(&self, ctx: &Context) -> bool {
        ctx.pool_id() == self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops every loop. Jobs still queued are dropped; running jobs finish.
    pub(crate) fn close(&self) {
        self.token.cancel();
    }

    /// Waits up to `grace` for loop threads to exit.
    ///
    /// Returns the sorted names of loops still running after `grace`; their threads
    /// are detached.
    pub(crate) fn join(&self, grace: Duration) -> Vec<String> {
        let threads = std::mem::take(
            &mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let deadline = Instant::now() + grace;

        while Instant::now() < deadline && threads.iter().any(|t| !t.handle.is_finished()) {
            thread::sleep(JOIN_POLL);
        }

        let mut stuck = Vec::new();
        for t in threads {
            if t.handle.is_finished() {
                let _ = t.handle.join();
            } else {
                stuck.push(t.name.to_string());
            }
        }
        stuck.sort_unstable();
        stuck
    }
}

impl Drop for ContextPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Builds one loop's runtime and starts its thread.
fn spawn_loop(
    pool: u64,
    index: usize,
    name: Arc<str>,
    token: CancellationToken,
    bus: Bus,
) -> std::io::Result<(Context, thread::JoinHandle<()>)> {
    let rt = runtime::Builder::new_current_thread().enable_all().build()?;
    let (tx, rx) = mpsc::unbounded_channel::<Job>();
    let ctx = Context::new(pool, index, Arc::clone(&name), tx, rt.handle().clone(), token);

    let loop_ctx = ctx.clone();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_loop(loop_ctx, rt, rx, bus))?;
    Ok((ctx, handle))
}

/// Body of a loop thread: runs queued jobs until the pool token is cancelled.
fn run_loop(ctx: Context, rt: runtime::Runtime, mut rx: mpsc::UnboundedReceiver<Job>, bus: Bus) {
    let name: Arc<str> = ctx.name().into();
    let token = ctx.token();
    ctx.enter();
    bus.publish(Event::new(EventKind::ContextStarted).with_context(Arc::clone(&name)));

    rt.block_on(async {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => run_job(job, &name, &bus),
                    None => break,
                },
            }
        }
    });

    // Dropped jobs and futures release their completions here, on the loop thread.
    rx.close();
    drop(rx);
    drop(rt);
    Context::leave();
    bus.publish(Event::new(EventKind::ContextStopped).with_context(name));
}

fn run_job(job: Job, name: &Arc<str>, bus: &Bus) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        let info = panic_message(payload.as_ref());
        tracing::error!(context = %name, panic = %info, "job panicked on event loop");
        bus.publish(
            Event::new(EventKind::ContextPanicked)
                .with_context(Arc::clone(name))
                .with_reason(info),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    fn pool(size: usize) -> ContextPool {
        let cfg = Config {
            pool_size: size,
            thread_prefix: "test-loop".into(),
            ..Config::default()
        };
        ContextPool::new(&cfg, Bus::new(64)).expect("pool")
    }

    #[test]
    fn acquire_is_round_robin() {
        let pool = pool(3);
        let ids: Vec<usize> = (0..6).map(|_| pool.acquire().id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(pool.contexts()[1].name(), "test-loop-1");
        pool.close();
        assert!(pool.join(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn jobs_run_in_order_on_the_loop_thread() {
        let pool = pool(1);
        let ctx = pool.acquire();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..20 {
            let tx = tx.clone();
            let expected = ctx.clone();
            ctx.submit(move || {
                let on_loop = Context::current().is_some_and(|c| c.same_loop(&expected));
                let thread = thread::current().name().map(str::to_owned);
                tx.send((i, on_loop, thread)).unwrap();
            })
            .unwrap();
        }

        let seen: Vec<_> = (0..20).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(seen.iter().map(|s| s.0).collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());
        assert!(seen.iter().all(|s| s.1));
        assert!(seen.iter().all(|s| s.2.as_deref() == Some("test-loop-0")));
        assert!(!ctx.is_current());

        pool.close();
        pool.join(Duration::from_secs(5));
    }

    #[test]
    fn spawned_futures_stay_on_the_loop() {
        let pool = pool(2);
        let ctx = pool.acquire();
        let (tx, rx) = std_mpsc::channel();
        let expected = ctx.clone();

        ctx.spawn(async move {
            tokio::task::yield_now().await;
            let on_loop = Context::current().is_some_and(|c| c.same_loop(&expected));
            tx.send(on_loop).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        pool.close();
        pool.join(Duration::from_secs(5));
    }

    #[test]
    fn panicking_job_does_not_kill_the_loop() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let cfg = Config {
            pool_size: 1,
            ..Config::default()
        };
        let pool = ContextPool::new(&cfg, bus).unwrap();
        let ctx = pool.acquire();
        let (tx, rx) = std_mpsc::channel();

        ctx.submit(|| panic!("job exploded")).unwrap();
        ctx.submit(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut saw_panic = false;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::ContextPanicked {
                assert_eq!(ev.reason.as_deref(), Some("job exploded"));
                saw_panic = true;
            }
        }
        assert!(saw_panic);

        pool.close();
        pool.join(Duration::from_secs(5));
    }

    #[test]
    fn submit_after_close_is_rejected() {
        let pool = pool(1);
        let ctx = pool.acquire();
        pool.close();
        assert!(pool.is_closed());
        assert!(ctx.is_closed());
        assert!(matches!(ctx.submit(|| {}), Err(crate::RunnerError::Closed)));
        assert!(pool.join(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn join_reports_busy_loops() {
        let pool = pool(1);
        let ctx = pool.acquire();
        let (started_tx, started_rx) = std_mpsc::channel();
        ctx.submit(move || {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap();
        started_rx.recv().unwrap();

        pool.close();
        assert_eq!(pool.join(Duration::from_millis(20)), vec!["test-loop-0".to_string()]);
    }
}
