//! The shared promise state: the rendezvous cell between one producer and
//! the continuations waiting on it.
//!
//! A state holds either a pending slot, a settled [`Expect`], and the list
//! of waiters attached before settlement. One mutex per state serializes
//! attachment against resolution; every handoff to a waiter passes through a
//! lock release followed by a queue push (or an inline call), which is what
//! establishes happens-before across the producer/consumer boundary.
//!
//! Two flavors share the discipline:
//!
//! - [`State`] — the unique flavor. The settled value is moved into the one
//!   continuation that may ever attach (or into a blocking `wait`).
//! - [`SharedState`] — the shared flavor, reached through `share()`. The
//!   settled value is retained and every waiter receives a clone.

use std::mem;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::Error;
use crate::expect::Expect;
use crate::queue::Queue;

/// Where a waiter runs once its state settles.
pub(crate) enum Target {
    /// Push onto a work queue; a worker runs the waiter later.
    Queue(Arc<Queue>),
    /// Run on the resolving (or attaching) thread. Reserved for internal
    /// forwarding that executes no user code.
    Inline,
}

/// A waiter body: consumes the settled outcome.
pub(crate) type WaiterFn<T> = Box<dyn FnOnce(Expect<T>) + Send + 'static>;

fn dispatch(target: Target, task: impl FnOnce() + Send + 'static) {
    match target {
        Target::Inline => task(),
        Target::Queue(queue) => queue.push(task),
    }
}

enum Slot<T> {
    Pending,
    Ready(Expect<T>),
    Consumed,
}

/// The unique-flavor state: settled exactly once, observed exactly once.
pub(crate) struct State<T> {
    inner: Mutex<Inner<T>>,
    resolved: Condvar,
}

struct Inner<T> {
    slot: Slot<T>,
    waiter: Option<(WaiterFn<T>, Target)>,
    attached: bool,
}

impl<T: Send + 'static> State<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                slot: Slot::Pending,
                waiter: None,
                attached: false,
            }),
            resolved: Condvar::new(),
        })
    }

    /// Settles the state. The waiter attached while pending, if any, is
    /// dispatched after the lock is released.
    pub(crate) fn resolve(&self, expect: Expect<T>) -> Result<(), Error> {
        let dispatched = {
            let mut inner = self.inner.lock();
            if !matches!(inner.slot, Slot::Pending) {
                return Err(Error::PromiseAlreadyResolved);
            }
            match inner.waiter.take() {
                Some((waiter, target)) => {
                    inner.slot = Slot::Consumed;
                    Some((waiter, target, expect))
                }
                None => {
                    inner.slot = Slot::Ready(expect);
                    None
                }
            }
        };
        self.resolved.notify_all();
        if let Some((waiter, target, expect)) = dispatched {
            dispatch(target, move || waiter(expect));
        }
        Ok(())
    }

    /// Attaches the single allowed waiter. If the state is already settled
    /// the waiter is dispatched immediately (after the lock is released).
    pub(crate) fn attach(&self, waiter: WaiterFn<T>, target: Target) -> Result<(), Error> {
        let ready = {
            let mut inner = self.inner.lock();
            if inner.attached {
                return Err(Error::PromiseAlreadyConsumed);
            }
            inner.attached = true;
            match mem::replace(&mut inner.slot, Slot::Consumed) {
                Slot::Pending => {
                    inner.slot = Slot::Pending;
                    inner.waiter = Some((waiter, target));
                    None
                }
                Slot::Ready(expect) => Some((waiter, target, expect)),
                Slot::Consumed => return Err(Error::PromiseAlreadyConsumed),
            }
        };
        if let Some((waiter, target, expect)) = ready {
            dispatch(target, move || waiter(expect));
        }
        Ok(())
    }

    /// Blocks until the state settles and moves the outcome out. Counts as
    /// the single allowed observation.
    pub(crate) fn wait(&self) -> Result<Expect<T>, Error> {
        let mut inner = self.inner.lock();
        if inner.attached {
            return Err(Error::PromiseAlreadyConsumed);
        }
        inner.attached = true;
        loop {
            match mem::replace(&mut inner.slot, Slot::Consumed) {
                Slot::Pending => {
                    inner.slot = Slot::Pending;
                    self.resolved.wait(&mut inner);
                }
                Slot::Ready(expect) => return Ok(expect),
                Slot::Consumed => return Err(Error::PromiseAlreadyConsumed),
            }
        }
    }
}

enum SharedSlot<T> {
    Pending,
    Ready(Expect<T>),
}

/// The shared-flavor state: settled exactly once, observed any number of
/// times through clones of the outcome.
pub(crate) struct SharedState<T> {
    inner: Mutex<SharedInner<T>>,
    resolved: Condvar,
}

struct SharedInner<T> {
    slot: SharedSlot<T>,
    waiters: SmallVec<[(WaiterFn<T>, Target); 2]>,
}

impl<T: Clone + Send + 'static> SharedState<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SharedInner {
                slot: SharedSlot::Pending,
                waiters: SmallVec::new(),
            }),
            resolved: Condvar::new(),
        })
    }

    /// Settles the state and dispatches every pending waiter with its own
    /// clone of the outcome.
    pub(crate) fn resolve(&self, expect: Expect<T>) -> Result<(), Error> {
        let dispatched = {
            let mut inner = self.inner.lock();
            if !matches!(inner.slot, SharedSlot::Pending) {
                return Err(Error::PromiseAlreadyResolved);
            }
            let waiters = mem::take(&mut inner.waiters);
            let dispatched: Vec<_> = waiters
                .into_iter()
                .map(|(waiter, target)| (waiter, target, expect.clone()))
                .collect();
            inner.slot = SharedSlot::Ready(expect);
            dispatched
        };
        self.resolved.notify_all();
        for (waiter, target, expect) in dispatched {
            dispatch(target, move || waiter(expect));
        }
        Ok(())
    }

    /// Attaches a waiter; dispatches immediately with a clone if already
    /// settled.
    pub(crate) fn attach(&self, waiter: WaiterFn<T>, target: Target) {
        let ready = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.slot {
                SharedSlot::Pending => {
                    inner.waiters.push((waiter, target));
                    None
                }
                SharedSlot::Ready(expect) => Some((waiter, target, expect.clone())),
            }
        };
        if let Some((waiter, target, expect)) = ready {
            dispatch(target, move || waiter(expect));
        }
    }

    /// Blocks until the state settles and returns a clone of the outcome.
    pub(crate) fn wait(&self) -> Expect<T> {
        let mut inner = self.inner.lock();
        loop {
            if let SharedSlot::Ready(expect) = &inner.slot {
                return expect.clone();
            }
            self.resolved.wait(&mut inner);
        }
    }
}
