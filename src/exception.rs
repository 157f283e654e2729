//! The opaque exception handle carried through promise chains.
//!
//! Every failure travelling through a chain — a library error, a user error
//! returned from a fallible continuation, a caught panic — is erased into an
//! [`Exception`]: a cheap, clonable handle over the underlying error value.
//! Typed recovery (`Promise::fail_match`) downcasts the handle back to a
//! concrete error type.
//!
//! `Exception` deliberately does **not** implement [`std::error::Error`]
//! itself: that keeps the blanket `From<E: Error>` conversion coherent, so
//! user code can use `?` and `.into()` with any error type.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A clonable, type-erased handle to an exception travelling along a chain.
///
/// Exceptions are first-class results: they pass through `then` untouched,
/// are consumed by matching `fail` handlers, and surface through the
/// process-level uncaught hook at `done()`.
#[derive(Clone)]
pub struct Exception {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Exception {
    /// Wraps a concrete error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Creates an exception from a bare message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Converts a caught panic payload into an exception.
    ///
    /// String payloads (`panic!("...")`) keep their message; anything else
    /// is reported as an opaque panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast::<String>()
            .map(|s| *s)
            .or_else(|payload| payload.downcast::<&'static str>().map(|s| (*s).to_owned()))
            .unwrap_or_else(|_| "panic with non-string payload".to_owned());
        Self::new(Panic { message })
    }

    /// Returns `true` if the carried error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>().is_some()
    }

    /// Downcasts the carried error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Borrows the carried error as a standard error trait object.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exception({:?})", self.inner)
    }
}

impl<E> From<E> for Exception
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// A string-only exception payload.
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// The error type wrapping a panic caught inside a continuation or task.
#[derive(Debug, Clone)]
pub struct Panic {
    message: String,
}

impl Panic {
    /// Returns the panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl StdError for Panic {}

type UncaughtHandler = Arc<dyn Fn(&Exception) + Send + Sync + 'static>;

static UNCAUGHT_HANDLER: Mutex<Option<UncaughtHandler>> = Mutex::new(None);

/// Installs the process-level handler invoked when a chain ends in `done()`
/// with an unhandled exception. Returns the previously installed handler.
pub fn set_uncaught_exception_handler(
    handler: impl Fn(&Exception) + Send + Sync + 'static,
) -> Option<Arc<dyn Fn(&Exception) + Send + Sync + 'static>> {
    UNCAUGHT_HANDLER.lock().replace(Arc::new(handler))
}

/// Removes the process-level uncaught-exception handler, restoring the
/// default (a `tracing` error event).
pub fn clear_uncaught_exception_handler(
) -> Option<Arc<dyn Fn(&Exception) + Send + Sync + 'static>> {
    UNCAUGHT_HANDLER.lock().take()
}

/// Routes an unhandled exception to the installed hook.
pub(crate) fn report_uncaught(exception: &Exception) {
    let handler = UNCAUGHT_HANDLER.lock().clone();
    match handler {
        Some(handler) => (*handler)(exception),
        None => tracing::error!(%exception, "unhandled promise exception"),
    }
}
