//! The deferred producer: the write end of a promise.
//!
//! A [`Deferred`] owns the write half of exactly one state plus the
//! not-yet-handed-out read end. Clones share a single resolution budget —
//! whichever clone resolves first wins, and later attempts fail with
//! [`Error::PromiseAlreadyResolved`]. When the last clone is dropped with
//! the state still pending, the state is resolved to a
//! [`BrokenPromise`] exception so no reader waits forever.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BrokenPromise, Error};
use crate::exception::Exception;
use crate::expect::Expect;
use crate::promise::Promise;
use crate::state::State;

/// The write end of a promise. Clonable; all clones resolve the same state.
pub struct Deferred<T: Send + 'static> {
    core: Arc<DeferredCore<T>>,
}

struct DeferredCore<T: Send + 'static> {
    state: Arc<State<T>>,
    promise: Mutex<Option<Promise<T>>>,
}

impl<T: Send + 'static> Drop for DeferredCore<T> {
    fn drop(&mut self) {
        // Last producer gone with the state still pending: break the promise
        // rather than leaving readers waiting.
        let _ = self
            .state
            .resolve(Expect::Exception(Exception::new(BrokenPromise::unfulfilled())));
    }
}

/// Creates a new deferred; its promise is obtained via
/// [`Deferred::get_promise`].
pub fn defer<T: Send + 'static>() -> Deferred<T> {
    Deferred::new_with_promise()
}

/// Creates an immediately resolved promise carrying `value`.
pub fn with<T: Send + 'static>(value: T) -> Promise<T> {
    let state = State::new();
    state
        .resolve(Expect::Value(value))
        .expect("freshly created state resolves once");
    Promise::from_state(state)
}

/// Creates an immediately failed promise carrying `exception`.
pub fn failed<T: Send + 'static>(exception: impl Into<Exception>) -> Promise<T> {
    let state = State::new();
    state
        .resolve(Expect::Exception(exception.into()))
        .expect("freshly created state resolves once");
    Promise::from_state(state)
}

impl<T: Send + 'static> Deferred<T> {
    /// Creates a deferred together with its promise, already taken out.
    pub(crate) fn new_pair() -> (Self, Promise<T>) {
        let state = State::new();
        let promise = Promise::from_state(Arc::clone(&state));
        let deferred = Self {
            core: Arc::new(DeferredCore {
                state,
                promise: Mutex::new(None),
            }),
        };
        (deferred, promise)
    }

    fn new_with_promise() -> Self {
        let (deferred, promise) = Self::new_pair();
        *deferred.core.promise.lock() = Some(promise);
        deferred
    }

    /// Moves the read end out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeferredAlreadyTaken`] on the second and later calls.
    pub fn get_promise(&self) -> Result<Promise<T>, Error> {
        self.core
            .promise
            .lock()
            .take()
            .ok_or(Error::DeferredAlreadyTaken)
    }

    /// Resolves the state to a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn set_value(&self, value: T) -> Result<(), Error> {
        self.core.state.resolve(Expect::Value(value))
    }

    /// Resolves the state to an exception.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn set_exception(&self, exception: impl Into<Exception>) -> Result<(), Error> {
        self.core
            .state
            .resolve(Expect::Exception(exception.into()))
    }

    /// Resolves the state to whichever side the outcome carries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn set_expect(&self, expect: Expect<T>) -> Result<(), Error> {
        self.core.state.resolve(expect)
    }

    /// Invokes `f` synchronously and resolves with its result; a panic in
    /// `f` resolves the state to the caught exception.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn set_by_fun(&self, f: impl FnOnce() -> T) -> Result<(), Error> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => self.set_value(value),
            Err(payload) => self.set_exception(Exception::from_panic(payload)),
        }
    }

    /// Invokes a fallible `f` synchronously: `Ok` resolves to the value,
    /// `Err` (and any panic) resolves to the exception.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn try_set_by_fun<E>(&self, f: impl FnOnce() -> std::result::Result<T, E>) -> Result<(), Error>
    where
        E: Into<Exception>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => self.set_value(value),
            Ok(Err(e)) => self.set_exception(e),
            Err(payload) => self.set_exception(Exception::from_panic(payload)),
        }
    }

    /// Chains this deferred's resolution to `promise`: both the value and
    /// the exception side are forwarded when it settles.
    ///
    /// # Errors
    ///
    /// Returns an error if `promise` was already consumed by another
    /// continuation.
    pub fn satisfy(&self, promise: Promise<T>) -> Result<(), Error> {
        let this = self.clone();
        promise.attach_inline(move |expect| {
            let _ = this.set_expect(expect);
        })
    }

    /// Invokes `f`; the returned promise's outcome becomes this deferred's
    /// resolution. A panic in `f` resolves the state to a
    /// [`BrokenPromise`] carrying the panic as its cause.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PromiseAlreadyResolved`] if the state was already
    /// settled.
    pub fn satisfy_by_fun(&self, f: impl FnOnce() -> Promise<T>) -> Result<(), Error> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(promise) => self.satisfy(promise),
            Err(payload) => self.set_exception(BrokenPromise::with_cause(
                Exception::from_panic(payload),
            )),
        }
    }
}

impl<T: Send + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new_with_promise()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("promise_taken", &self.core.promise.lock().is_none())
            .finish()
    }
}
