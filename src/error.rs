//! Library error types.
//!
//! Misuse of the library surface (double resolution, double attachment,
//! popping an empty queue) is reported as a typed [`Error`]. Failures that
//! travel *through* chains are [`Exception`]s; a library `Error` crossing
//! into a chain is wrapped into an `Exception` like any other error.

use std::error::Error as StdError;
use std::fmt;

use crate::exception::Exception;
use crate::expect::Expect;

/// Errors produced by misusing the library surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A second value or exception was written to an already-resolved state.
    #[error("promise already resolved")]
    PromiseAlreadyResolved,
    /// A second continuation was attached to a unique promise.
    #[error("promise already consumed by another continuation")]
    PromiseAlreadyConsumed,
    /// `get_promise` was called twice on one deferred.
    #[error("promise already taken from this deferred")]
    DeferredAlreadyTaken,
    /// `pop` was called on an empty queue.
    #[error("pop on an empty queue")]
    QueueEmpty,
    /// A well-known process queue was looked up before being installed.
    #[error("no {0} queue installed")]
    NoQueue(&'static str),
}

/// A specialized `Result` for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The exception resolving a promise whose producer went away, or whose
/// producing function itself failed.
///
/// Carried as the outcome when a deferred is dropped unresolved (no cause),
/// or when the function handed to `satisfy_by_fun` panics (the panic as
/// cause).
#[derive(Debug, Clone)]
pub struct BrokenPromise {
    cause: Option<Exception>,
}

impl BrokenPromise {
    /// A broken promise with no underlying cause: the producer was dropped.
    pub fn unfulfilled() -> Self {
        Self { cause: None }
    }

    /// A broken promise caused by a failure in the producing function.
    pub fn with_cause(cause: Exception) -> Self {
        Self { cause: Some(cause) }
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_ref()
    }
}

impl fmt::Display for BrokenPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "broken promise: {cause}"),
            None => f.write_str("broken promise"),
        }
    }
}

impl StdError for BrokenPromise {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_error() as &(dyn StdError + 'static))
    }
}

/// The aggregate exception of the list form of `all`.
///
/// Carries every element's settled outcome in input order — values where the
/// input succeeded, exceptions where it failed.
pub struct CombinedPromiseException<T> {
    expects: Vec<Expect<T>>,
}

impl<T> CombinedPromiseException<T> {
    /// Wraps the per-element outcomes.
    pub fn new(expects: Vec<Expect<T>>) -> Self {
        Self { expects }
    }

    /// The per-element outcomes, in input order.
    pub fn expects(&self) -> &[Expect<T>] {
        &self.expects
    }

    /// Moves the per-element outcomes out.
    pub fn into_expects(self) -> Vec<Expect<T>> {
        self.expects
    }

    fn failed(&self) -> usize {
        self.expects.iter().filter(|e| e.has_exception()).count()
    }
}

impl<T> fmt::Debug for CombinedPromiseException<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedPromiseException")
            .field("total", &self.expects.len())
            .field("failed", &self.failed())
            .finish()
    }
}

impl<T> fmt::Display for CombinedPromiseException<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} combined promises failed",
            self.failed(),
            self.expects.len()
        )
    }
}

impl<T> StdError for CombinedPromiseException<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            Error::PromiseAlreadyResolved.to_string(),
            "promise already resolved"
        );
        assert_eq!(Error::QueueEmpty.to_string(), "pop on an empty queue");
        assert_eq!(
            Error::NoQueue("default").to_string(),
            "no default queue installed"
        );
    }

    #[test]
    fn broken_promise_without_cause() {
        let broken = BrokenPromise::unfulfilled();
        assert_eq!(broken.to_string(), "broken promise");
        assert!(broken.cause().is_none());
        assert!(broken.source().is_none());
    }

    #[test]
    fn broken_promise_with_cause_chains_source() {
        let broken = BrokenPromise::with_cause(Exception::msg("inner failure"));
        assert_eq!(broken.to_string(), "broken promise: inner failure");
        let source = broken.source().expect("source");
        assert_eq!(source.to_string(), "inner failure");
    }

    #[test]
    fn combined_exception_counts_failures() {
        let combined = CombinedPromiseException::new(vec![
            Expect::Value(1),
            Expect::Exception(Exception::msg("bad")),
            Expect::Value(3),
        ]);
        assert_eq!(combined.to_string(), "1 of 3 combined promises failed");
        assert_eq!(combined.expects().len(), 3);
        assert!(combined.expects()[1].has_exception());
    }

    #[test]
    fn combined_exception_debug_has_no_value_bound() {
        struct Opaque;
        let combined = CombinedPromiseException::new(vec![Expect::Value(Opaque)]);
        let rendered = format!("{combined:?}");
        assert!(rendered.contains("total: 1"));
        assert!(rendered.contains("failed: 0"));
    }

    #[test]
    fn library_errors_convert_into_exceptions() {
        let exception: Exception = Error::QueueEmpty.into();
        assert!(exception.is::<Error>());
    }
}
