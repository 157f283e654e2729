//! Named worker threads whose result becomes a promise.
//!
//! [`run`] spawns one OS thread around a closure; the closure's return value
//! — or the panic that replaced it — resolves the thread's promise. This is
//! the one-shot counterpart of the pool: no queue, one task, one result.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crate::deferred::Deferred;
use crate::error::Error;
use crate::exception::Exception;
use crate::promise::Promise;

/// A handle to a running named thread and the promise of its result.
pub struct Thread<T: Send + 'static> {
    name: String,
    handle: Option<JoinHandle<()>>,
    promise: Option<Promise<T>>,
}

/// Starts a named OS thread running `f`; its result (or panic) resolves the
/// thread's promise.
///
/// # Panics
///
/// Panics if the OS refuses to spawn the thread.
pub fn run<T, F>(name: impl Into<String>, f: F) -> Thread<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let name = name.into();
    let (deferred, promise) = Deferred::new_pair();

    let thread_name = name.clone();
    let handle = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            tracing::debug!(thread = %thread_name, "named thread started");
            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => {
                    let _ = deferred.set_value(value);
                }
                Err(payload) => {
                    let exception = Exception::from_panic(payload);
                    tracing::error!(thread = %thread_name, %exception, "named thread failed");
                    let _ = deferred.set_exception(exception);
                }
            }
        })
        .expect("failed to spawn named thread");

    Thread {
        name,
        handle: Some(handle),
        promise: Some(promise),
    }
}

impl<T: Send + 'static> Thread<T> {
    /// The thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Moves the result promise out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeferredAlreadyTaken`] on the second and later
    /// calls.
    pub fn promise(&mut self) -> Result<Promise<T>, Error> {
        self.promise.take().ok_or(Error::DeferredAlreadyTaken)
    }

    /// Joins the OS thread and returns its settled result.
    ///
    /// # Errors
    ///
    /// Returns the exception the thread body failed with, or a wrapped
    /// [`Error::DeferredAlreadyTaken`] if the promise was moved out earlier.
    pub fn join(mut self) -> Result<T, Exception> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        match self.promise.take() {
            Some(promise) => promise.get(),
            None => Err(Exception::new(Error::DeferredAlreadyTaken)),
        }
    }
}

impl<T: Send + 'static> Drop for Thread<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Thread<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("joined", &self.handle.is_none())
            .field("promise_taken", &self.promise.is_none())
            .finish()
    }
}
