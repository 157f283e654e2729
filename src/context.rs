//! Process bootstrap: one pool, three well-known queues, guarded globals.
//!
//! An [`ExecutionContext`] builds the `main`/`default`/`background` queues,
//! spawns a pool serving them, and installs them as the process-wide
//! well-known queues. Dropping the context tears everything down in reverse:
//! the globals are restored first (so no new work can target the queues),
//! then the pool drains and joins.

use std::sync::Arc;

use crate::config::ContextConfig;
use crate::pool::{PoolOptions, ThreadPool};
use crate::promise::Promise;
use crate::queue::{
    set_background_queue, set_default_queue, set_main_queue, Queue,
};

/// A running execution environment: the three well-known queues, the pool
/// draining them, and the global registrations binding them together.
pub struct ExecutionContext {
    main: Arc<Queue>,
    background: Arc<Queue>,
    default: Arc<Queue>,
    previous_main: Option<Arc<Queue>>,
    previous_background: Option<Arc<Queue>>,
    previous_default: Option<Arc<Queue>>,
    pool: Option<ThreadPool>,
}

impl ExecutionContext {
    /// Builds the queues and pool described by `config` and installs the
    /// queues process-wide.
    ///
    /// # Panics
    ///
    /// Panics if `config.worker_threads` is 0.
    pub fn new(config: ContextConfig) -> Self {
        let main = Queue::make(config.main_priority);
        let background = Queue::make(config.background_priority);
        let default = Queue::make(config.default_priority);

        let pool = ThreadPool::new(
            vec![
                Arc::clone(&main),
                Arc::clone(&background),
                Arc::clone(&default),
            ],
            PoolOptions {
                threads: config.worker_threads,
                thread_name_prefix: config.thread_name_prefix,
                ..Default::default()
            },
        );

        let previous_main = set_main_queue(Some(Arc::clone(&main)));
        let previous_background = set_background_queue(Some(Arc::clone(&background)));
        let previous_default = set_default_queue(Some(Arc::clone(&default)));

        tracing::debug!("execution context installed");
        Self {
            main,
            background,
            default,
            previous_main,
            previous_background,
            previous_default,
            pool: Some(pool),
        }
    }

    /// The context's main queue.
    pub fn main_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.main)
    }

    /// The context's background queue.
    pub fn background_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.background)
    }

    /// The context's default queue.
    pub fn default_queue(&self) -> Arc<Queue> {
        Arc::clone(&self.default)
    }

    /// The pool serving the context's queues.
    pub fn pool(&self) -> &ThreadPool {
        self.pool.as_ref().expect("pool present until drop")
    }

    /// Begins pool termination; see [`ThreadPool::terminate`].
    pub fn terminate(&self) -> Promise<()> {
        self.pool().terminate()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        // Reverse of installation: restore globals last-set-first, then
        // drain and join the pool.
        set_default_queue(self.previous_default.take());
        set_background_queue(self.previous_background.take());
        set_main_queue(self.previous_main.take());
        self.pool.take();
        tracing::debug!("execution context torn down");
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
