//! Deferq: promise chaining over prioritized work queues and worker pools.
//!
//! # Overview
//!
//! Deferq represents an in-flight asynchronous computation as a chain of
//! promises. A [`Deferred`] producer resolves a shared state exactly once —
//! with a value or an exception — and the state dispatches every attached
//! continuation onto its target [`Queue`], where a [`ThreadPool`] worker
//! runs it. Each continuation builds the next link: an independent promise
//! resolved by the continuation's own outcome.
//!
//! # Core Guarantees
//!
//! - **Single resolution**: A state settles exactly once; later writes fail
//!   with [`Error::PromiseAlreadyResolved`]
//! - **No lost continuations**: Attach-then-fulfill and fulfill-then-attach
//!   both schedule every waiter exactly once
//! - **Chain order**: Continuations of one chain run in chain order, each
//!   seeing the previous result
//! - **Exceptions are first-class**: They skip `then` links untouched, are
//!   consumed by matching `fail` handlers, and reach the process
//!   uncaught-exception hook at `done()`
//! - **No broken rendezvous**: Dropping an unresolved producer settles the
//!   state with a [`BrokenPromise`] exception
//! - **Cooperative shutdown**: Pool termination drains queued work, never
//!   interrupts a running task, and resolves a promise when the last worker
//!   exits
//!
//! # Module Structure
//!
//! - [`expect`]: The value cell — a settled value or exception
//! - [`exception`]: The opaque exception handle and the uncaught hook
//! - [`error`]: Library error kinds and exception payload types
//! - [`deferred`]: The write end and the `defer`/`with`/`failed` factories
//! - [`promise`]: The read ends — unique `Promise`, clonable `SharedPromise`
//! - [`all`]: Aggregation of many promises into one
//! - [`queue`]: Prioritized FIFO work queues and the process queue registry
//! - [`pool`]: Worker threads draining queues by descending priority
//! - [`thread`]: One-shot named threads delivering their result as a promise
//! - [`config`], [`context`]: Bootstrap of a pool plus the three well-known
//!   queues
//!
//! # Example
//!
//! ```
//! use deferq::{all, with, ContextConfig, ExecutionContext};
//!
//! let context = ExecutionContext::new(ContextConfig::default().with_worker_threads(2));
//!
//! let answer = with(6)
//!     .then(|x| x * 7)
//!     .get()
//!     .expect("chain value");
//! assert_eq!(answer, 42);
//!
//! let combined = all((with(1), with("two"), with(3.0)))
//!     .get()
//!     .expect("combined value");
//! assert_eq!(combined, (1, "two", 3.0));
//!
//! drop(context);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod all;
pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod exception;
pub mod expect;
pub mod pool;
pub mod promise;
pub mod queue;
mod state;
pub mod thread;

pub use all::{all, All};
pub use config::ContextConfig;
pub use context::ExecutionContext;
pub use deferred::{defer, failed, with, Deferred};
pub use error::{BrokenPromise, CombinedPromiseException, Error};
pub use exception::{
    clear_uncaught_exception_handler, set_uncaught_exception_handler, Exception, Panic,
};
pub use expect::Expect;
pub use pool::{PoolOptions, ThreadPool};
pub use promise::{Promise, SharedPromise};
pub use queue::{
    background_queue, default_queue, main_queue, set_background_queue, set_default_queue,
    set_main_queue, Priority, Queue, Task,
};
pub use thread::{run, Thread};
