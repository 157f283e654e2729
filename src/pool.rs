//! The worker pool: OS threads draining prioritized work queues.
//!
//! Each worker loops: wait on the pool condvar, scan the queues in
//! descending priority, pop one task, run it. Queue consumer callbacks
//! installed at construction wake the pool whenever anything pushes.
//!
//! Termination is cooperative: [`ThreadPool::terminate`] flips a flag, wakes
//! every worker, and returns a promise that resolves when the last worker
//! has left its loop. Workers drain all remaining queued tasks before
//! exiting, and a running task is never interrupted. A panic inside a task
//! is caught per task, so a worker survives misbehaving work.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::deferred::Deferred;
use crate::promise::{Promise, SharedPromise};
use crate::queue::{Queue, Task};

/// Configuration for a [`ThreadPool`].
#[derive(Clone)]
pub struct PoolOptions {
    /// Number of worker threads; must be at least 1.
    pub threads: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Callback invoked on each worker thread as it starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback invoked on each worker thread as it stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            thread_name_prefix: "deferq".to_string(),
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("threads", &self.threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}

/// A pool of worker threads serving a priority-ordered set of queues.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

struct PoolInner {
    /// Queues sorted by descending priority at construction.
    queues: Vec<Arc<Queue>>,
    /// Pairs with `work_available`; held only around waits and notifies.
    lock: Mutex<()>,
    work_available: Condvar,
    terminating: AtomicBool,
    live_workers: AtomicUsize,
    /// Resolved by the last worker leaving its loop.
    termination: Deferred<()>,
    terminated: SharedPromise<()>,
    on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ThreadPool {
    /// Spawns a pool serving the given queues.
    ///
    /// # Panics
    ///
    /// Panics if `options.threads` is 0 or a worker thread cannot be
    /// spawned.
    pub fn new(queues: Vec<Arc<Queue>>, options: PoolOptions) -> Self {
        assert!(options.threads > 0, "thread pool needs at least one worker");

        let mut queues = queues;
        queues.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let (termination, termination_promise) = Deferred::new_pair();
        let terminated = termination_promise.share();

        let inner = Arc::new(PoolInner {
            queues,
            lock: Mutex::new(()),
            work_available: Condvar::new(),
            terminating: AtomicBool::new(false),
            live_workers: AtomicUsize::new(options.threads),
            termination,
            terminated,
            on_thread_start: options.on_thread_start,
            on_thread_stop: options.on_thread_stop,
        });

        // Every push into a served queue wakes a worker. The callback takes
        // the pool lock before notifying, which closes the window between a
        // worker's emptiness check and its wait.
        for queue in &inner.queues {
            let pool = Arc::downgrade(&inner);
            let backlog = queue.set_consumer(move |_backlog| {
                if let Some(pool) = pool.upgrade() {
                    let _guard = pool.lock.lock();
                    pool.work_available.notify_one();
                }
            });
            if backlog > 0 {
                let _guard = inner.lock.lock();
                inner.work_available.notify_all();
            }
        }

        let handles = (0..options.threads)
            .map(|index| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("{}-worker-{index}", options.thread_name_prefix))
                    .spawn(move || worker_loop(&inner))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self {
            inner,
            handles: Mutex::new(handles),
        }
    }

    /// Begins cooperative termination and returns a promise that resolves
    /// once every worker has left its loop.
    ///
    /// Workers finish draining all queued tasks first; the running task, if
    /// any, is never interrupted. Calling this more than once is fine; every
    /// returned promise resolves on the same event.
    pub fn terminate(&self) -> Promise<()> {
        tracing::debug!("pool termination requested");
        self.inner.terminating.store(true, Ordering::Release);
        drop(self.inner.lock.lock());
        self.inner.work_available.notify_all();
        self.inner.terminated.unshare()
    }

    /// Joins every worker thread. Callers normally `terminate()` first;
    /// dropping the pool does both.
    pub fn await_termination(&self) {
        let mut handles = self.handles.lock();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Returns `true` once termination has been requested.
    pub fn is_terminating(&self) -> bool {
        self.inner.terminating.load(Ordering::Acquire)
    }

    /// Number of workers that have not yet left their loop.
    pub fn live_workers(&self) -> usize {
        self.inner.live_workers.load(Ordering::Acquire)
    }

    /// The served queues, in descending priority order.
    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.inner.queues
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let _ = self.terminate();
        self.await_termination();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("queues", &self.inner.queues.len())
            .field("live_workers", &self.live_workers())
            .field("terminating", &self.is_terminating())
            .finish()
    }
}

fn pop_any(inner: &PoolInner) -> Option<Task> {
    inner.queues.iter().find_map(|queue| queue.pop().ok())
}

fn worker_loop(inner: &Arc<PoolInner>) {
    if let Some(callback) = &inner.on_thread_start {
        callback();
    }
    tracing::debug!("pool worker started");

    loop {
        if let Some(task) = pop_any(inner) {
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("pool task panicked");
            }
            continue;
        }

        if inner.terminating.load(Ordering::Acquire) {
            break;
        }

        let mut guard = inner.lock.lock();
        // Re-check under the pool lock: the consumer callback also takes it,
        // so a push between the pop attempt and this wait is never lost.
        if inner.queues.iter().all(|queue| queue.empty())
            && !inner.terminating.load(Ordering::Acquire)
        {
            inner.work_available.wait(&mut guard);
        }
    }

    if let Some(callback) = &inner.on_thread_stop {
        callback();
    }
    tracing::debug!("pool worker exiting");

    if inner.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
        let _ = inner.termination.set_value(());
    }
}
