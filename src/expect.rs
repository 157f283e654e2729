//! The value cell: a settled outcome is either a value or an exception.

use crate::exception::Exception;

/// A settled outcome: the value a producer delivered, or the exception that
/// replaced it.
///
/// `Expect` is what travels from a resolved state into each waiting
/// continuation, and what the list form of `all` aggregates per element.
#[derive(Debug, Clone)]
pub enum Expect<T> {
    /// The producer delivered a value.
    Value(T),
    /// The producer delivered an exception.
    Exception(Exception),
}

impl<T> Expect<T> {
    /// Returns `true` if this outcome carries an exception.
    pub fn has_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    /// Borrows the carried exception, if any.
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Self::Exception(e) => Some(e),
            Self::Value(_) => None,
        }
    }

    /// Moves the value out.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is an exception; callers check
    /// [`has_exception`](Self::has_exception) first.
    pub fn consume(self) -> T {
        match self {
            Self::Value(value) => value,
            Self::Exception(e) => panic!("consume on an exception outcome: {e}"),
        }
    }

    /// Converts into a `Result`, moving whichever side is present.
    pub fn into_result(self) -> Result<T, Exception> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Exception(e) => Err(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for Expect<T>
where
    E: Into<Exception>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(e) => Self::Exception(e.into()),
        }
    }
}
