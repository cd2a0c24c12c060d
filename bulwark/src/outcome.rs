//! The unit passed between pipeline layers.

use crate::errors::{ErrorKind, ResilienceError};

/// The result of one attempted operation: a value or a captured failure.
///
/// An `Outcome` is produced by the user callable (or by a strategy that
/// substitutes a result) and consumed by the next strategy out.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation produced a value.
    Value(T),
    /// The operation failed.
    Error(ResilienceError),
}

impl<T> Outcome<T> {
    /// Creates a value outcome.
    pub const fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Creates an error outcome.
    pub const fn error(error: ResilienceError) -> Self {
        Self::Error(error)
    }

    /// Creates an error outcome from any user failure.
    pub fn failure<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Error(ResilienceError::failure(error))
    }

    /// Creates a cancellation outcome.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Error(ResilienceError::cancelled(reason))
    }

    /// Returns true if this outcome carries a value.
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome carries a failure.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the value, if any.
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub const fn as_error(&self) -> Option<&ResilienceError> {
        match self {
            Self::Value(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    /// Returns the failure kind, if any.
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Value(_) => None,
            Self::Error(error) => Some(error.kind()),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, ResilienceError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }

    /// Maps the value, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Value(value) => Outcome::Value(f(value)),
            Self::Error(error) => Outcome::Error(error),
        }
    }

    /// Chains a fallible transformation of the value.
    pub fn and_then<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Self::Value(value) => f(value),
            Self::Error(error) => Outcome::Error(error),
        }
    }

    /// Short human-readable description, used in telemetry.
    pub fn describe(&self) -> String {
        match self {
            Self::Value(_) => "value".to_string(),
            Self::Error(error) => format!("{}: {error}", error.kind()),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<anyhow::Error>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_value_accessors() {
        let outcome = Outcome::value(7);
        assert!(outcome.is_value());
        assert_eq!(outcome.as_value(), Some(&7));
        assert!(outcome.error_kind().is_none());
        assert_eq!(outcome.into_result().ok(), Some(7));
    }

    #[test]
    fn test_from_result_preserves_strategy_kind() {
        let result: Result<u32, ResilienceError> =
            Err(ResilienceError::Timeout(Duration::from_secs(1)));
        let outcome = Outcome::from(result);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_from_io_error_is_failure() {
        let result: Result<u32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let outcome = Outcome::from(result);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Failure));
        assert!(outcome.as_error().is_some_and(ResilienceError::is::<std::io::Error>));
    }

    #[test]
    fn test_map_and_then() {
        let outcome = Outcome::value(2).map(|v| v * 10);
        assert_eq!(outcome.as_value(), Some(&20));

        let failed: Outcome<i32> = Outcome::value(2).and_then(|_| Outcome::cancelled("stop"));
        assert_eq!(failed.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Outcome::value(()).describe(), "value");
        let failed: Outcome<()> = Outcome::error(ResilienceError::IsolatedCircuit);
        assert!(failed.describe().starts_with("isolated_circuit"));
    }
}
