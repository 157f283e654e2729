//! Prioritized FIFO work queues and the process-wide queue registry.
//!
//! A [`Queue`] is the synchronization boundary between everything that
//! produces work (resolving states scheduling continuations, direct pushes)
//! and the worker pool that drains it. It is a plain FIFO with a priority
//! tag and a single optional consumer callback: `push` appends under the
//! queue lock, captures the callback and the post-push length in the same
//! critical section, and invokes the callback *outside* the lock.
//!
//! Three well-known queues exist process-wide — `main`, `background` and
//! `default` — installed once at startup (normally by
//! [`ExecutionContext`](crate::context::ExecutionContext)) and looked up
//! through guarded accessors.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

/// A unit of work: a boxed closure run once by a worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Queue priority; higher values are served first by the pool.
pub type Priority = usize;

type Consumer = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// An ordered FIFO of work items with a priority tag and a single optional
/// consumer callback fired on every push.
pub struct Queue {
    priority: Priority,
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    fifo: VecDeque<Task>,
    consumer: Option<Consumer>,
}

impl Queue {
    /// Creates a new queue with the given priority.
    pub fn make(priority: Priority) -> Arc<Self> {
        Arc::new(Self {
            priority,
            inner: Mutex::new(QueueInner {
                fifo: VecDeque::new(),
                consumer: None,
            }),
        })
    }

    /// Appends a task.
    ///
    /// The consumer callback and the post-push length are captured under the
    /// queue lock; the callback itself runs after the lock is released, so
    /// the caller is never blocked longer than the append.
    pub fn push(&self, task: impl FnOnce() + Send + 'static) {
        let (consumer, len) = {
            let mut inner = self.inner.lock();
            inner.fifo.push_back(Box::new(task));
            (inner.consumer.clone(), inner.fifo.len())
        };
        tracing::trace!(priority = self.priority, backlog = len, "task queued");
        if let Some(consumer) = consumer {
            consumer(len);
        }
    }

    /// Removes and returns the front task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueEmpty`] when there is nothing to pop; callers
    /// are expected to pop only after being notified.
    pub fn pop(&self) -> Result<Task, Error> {
        self.inner
            .lock()
            .fifo
            .pop_front()
            .ok_or(Error::QueueEmpty)
    }

    /// Replaces the consumer callback, returning the current backlog so a
    /// new consumer can immediately drain it.
    pub fn set_consumer(&self, consumer: impl Fn(usize) + Send + Sync + 'static) -> usize {
        let mut inner = self.inner.lock();
        inner.consumer = Some(Arc::new(consumer));
        inner.fifo.len()
    }

    /// Returns `true` if the queue holds no tasks.
    pub fn empty(&self) -> bool {
        self.inner.lock().fifo.is_empty()
    }

    /// Returns the queue's priority tag.
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Queue")
            .field("priority", &self.priority)
            .field("backlog", &inner.fifo.len())
            .field("consumer", &inner.consumer.is_some())
            .finish()
    }
}

static MAIN_QUEUE: Mutex<Option<Arc<Queue>>> = Mutex::new(None);
static BACKGROUND_QUEUE: Mutex<Option<Arc<Queue>>> = Mutex::new(None);
static DEFAULT_QUEUE: Mutex<Option<Arc<Queue>>> = Mutex::new(None);

/// Returns the process-wide main queue.
///
/// # Errors
///
/// Returns [`Error::NoQueue`] if none has been installed.
pub fn main_queue() -> Result<Arc<Queue>, Error> {
    MAIN_QUEUE.lock().clone().ok_or(Error::NoQueue("main"))
}

/// Returns the process-wide background queue.
///
/// # Errors
///
/// Returns [`Error::NoQueue`] if none has been installed.
pub fn background_queue() -> Result<Arc<Queue>, Error> {
    BACKGROUND_QUEUE
        .lock()
        .clone()
        .ok_or(Error::NoQueue("background"))
}

/// Returns the process-wide default queue — the target of every continuation
/// submitted without an explicit queue.
///
/// # Errors
///
/// Returns [`Error::NoQueue`] if none has been installed.
pub fn default_queue() -> Result<Arc<Queue>, Error> {
    DEFAULT_QUEUE.lock().clone().ok_or(Error::NoQueue("default"))
}

/// Installs (or, with `None`, removes) the process-wide main queue,
/// returning the previous one.
pub fn set_main_queue(queue: Option<Arc<Queue>>) -> Option<Arc<Queue>> {
    std::mem::replace(&mut *MAIN_QUEUE.lock(), queue)
}

/// Installs (or, with `None`, removes) the process-wide background queue,
/// returning the previous one.
pub fn set_background_queue(queue: Option<Arc<Queue>>) -> Option<Arc<Queue>> {
    std::mem::replace(&mut *BACKGROUND_QUEUE.lock(), queue)
}

/// Installs (or, with `None`, removes) the process-wide default queue,
/// returning the previous one.
pub fn set_default_queue(queue: Option<Arc<Queue>>) -> Option<Arc<Queue>> {
    std::mem::replace(&mut *DEFAULT_QUEUE.lock(), queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let queue = Queue::make(0);
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            queue.push(move || log.lock().push(i));
        }
        while let Ok(task) = queue.pop() {
            task();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn pop_on_empty_fails() {
        let queue = Queue::make(0);
        assert!(matches!(queue.pop(), Err(Error::QueueEmpty)));
    }

    #[test]
    fn consumer_sees_post_push_length() {
        let queue = Queue::make(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_consumer = Arc::clone(&seen);
        let backlog = queue.set_consumer(move |len| seen_by_consumer.lock().push(len));
        assert_eq!(backlog, 0);

        queue.push(|| {});
        queue.push(|| {});
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn set_consumer_reports_backlog() {
        let queue = Queue::make(0);
        queue.push(|| {});
        queue.push(|| {});
        let notified = Arc::new(AtomicUsize::new(0));
        let notified_in_consumer = Arc::clone(&notified);
        let backlog = queue.set_consumer(move |_| {
            notified_in_consumer.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(backlog, 2);
        // Replacing the consumer does not retroactively notify.
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_and_priority() {
        let queue = Queue::make(7);
        assert!(queue.empty());
        assert_eq!(queue.priority(), 7);
        queue.push(|| {});
        assert!(!queue.empty());
    }

    #[test]
    fn replacing_consumer_drops_previous() {
        let queue = Queue::make(0);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let hits = Arc::clone(&first);
        queue.set_consumer(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        let hits = Arc::clone(&second);
        queue.set_consumer(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        queue.push(|| {});
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
