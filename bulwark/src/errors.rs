//! Error types for the bulwark runtime.
//!
//! Failures produced by user code travel as [`anyhow::Error`] inside
//! [`ResilienceError::Failure`]; every other variant is raised by a strategy
//! and can be told apart by [`ErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A failure carried by an [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// A failure raised by the executed callable.
    #[error(transparent)]
    Failure(anyhow::Error),

    /// The circuit breaker is open and rejected the call without running it.
    #[error("The circuit is now open and is not allowing calls{}", fmt_retry_after(.retry_after))]
    BrokenCircuit {
        /// Time left until the breaker admits a probe, when known.
        retry_after: Option<Duration>,
    },

    /// The circuit breaker was manually isolated.
    #[error("The circuit is manually held open and is not allowing calls")]
    IsolatedCircuit,

    /// The timeout strategy's deadline elapsed.
    #[error("The operation didn't complete within the allowed timeout of {0:?}")]
    Timeout(Duration),

    /// The concurrency limiter had no free permit and no queue slot.
    #[error("The operation could not be executed because it was rejected by the concurrency limiter{}", fmt_retry_after(.retry_after))]
    Throttled {
        /// Suggested wait before trying again, when known.
        retry_after: Option<Duration>,
    },

    /// Cooperative cancellation was observed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| format!(" (retry after {d:?})"))
}

/// Fieldless classification of a [`ResilienceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A failure from the executed callable.
    Failure,
    /// Fast-fail from an open circuit.
    BrokenCircuit,
    /// Fast-fail from a manually isolated circuit.
    IsolatedCircuit,
    /// Deadline exceeded.
    Timeout,
    /// Rejected by a concurrency limiter.
    Throttled,
    /// Cancellation observed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Failure => "failure",
            Self::BrokenCircuit => "broken_circuit",
            Self::IsolatedCircuit => "isolated_circuit",
            Self::Timeout => "timeout",
            Self::Throttled => "throttled",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl ResilienceError {
    /// Wraps a user failure.
    pub fn failure<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::from(error.into())
    }

    /// Creates a cancellation error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Failure(_) => ErrorKind::Failure,
            Self::BrokenCircuit { .. } => ErrorKind::BrokenCircuit,
            Self::IsolatedCircuit => ErrorKind::IsolatedCircuit,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Returns true for `BrokenCircuit` and `IsolatedCircuit`.
    #[must_use]
    pub const fn is_circuit_rejection(&self) -> bool {
        matches!(self, Self::BrokenCircuit { .. } | Self::IsolatedCircuit)
    }

    /// Returns true if cancellation was observed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the user failure, if this is one.
    #[must_use]
    pub const fn as_failure(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Returns the user failure as `E` if it has that concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.as_failure().and_then(|error| error.downcast_ref::<E>())
    }

    /// Returns true if this is a user failure of concrete type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }
}

impl From<anyhow::Error> for ResilienceError {
    /// Recovers the original kind when user code re-raises a strategy error.
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(inner) => inner,
            Err(error) => Self::Failure(error),
        }
    }
}

/// Error raised when pipeline construction fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// Summary message.
    pub message: String,
    /// Strategies whose options failed validation.
    pub strategies: Vec<String>,
    /// One entry per violated rule.
    pub errors: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            strategies: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Builds an error from collected per-strategy failures.
    #[must_use]
    pub fn from_failures(failures: Vec<(String, Vec<String>)>) -> Self {
        let mut strategies = Vec::with_capacity(failures.len());
        let mut errors = Vec::new();
        for (strategy, messages) in failures {
            for message in messages {
                errors.push(format!("{strategy}: {message}"));
            }
            strategies.push(strategy);
        }

        let message = format!(
            "The resilience pipeline options are invalid.\n{}",
            errors.join("\n")
        );

        Self {
            message,
            strategies,
            errors,
        }
    }
}

/// Error raised while loading a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("Invalid pipeline configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("http {0}")]
    struct HttpError(u16);

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ResilienceError::IsolatedCircuit.kind(), ErrorKind::IsolatedCircuit);
        assert_eq!(
            ResilienceError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ResilienceError::failure(HttpError(500)).kind(),
            ErrorKind::Failure
        );
    }

    #[test]
    fn test_anyhow_roundtrip_keeps_kind() {
        let wrapped = anyhow::Error::new(ResilienceError::BrokenCircuit { retry_after: None });
        let error = ResilienceError::from(wrapped);
        assert!(error.is_circuit_rejection());
    }

    #[test]
    fn test_downcast_user_failure() {
        let error = ResilienceError::failure(HttpError(503));
        assert!(error.is::<HttpError>());
        assert_eq!(error.downcast_ref::<HttpError>().map(|e| e.0), Some(503));
        assert!(!ResilienceError::cancelled("x").is::<HttpError>());
    }

    #[test]
    fn test_display_messages() {
        let broken = ResilienceError::BrokenCircuit {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(broken.to_string().contains("circuit is now open"));
        assert!(broken.to_string().contains("2s"));

        let timeout = ResilienceError::Timeout(Duration::from_millis(100));
        assert!(timeout.to_string().contains("100ms"));
    }

    #[test]
    fn test_validation_error_from_failures() {
        let err = PipelineValidationError::from_failures(vec![(
            "Retry".to_string(),
            vec!["max_retry_attempts must be at least 1".to_string()],
        )]);
        assert_eq!(err.strategies, vec!["Retry".to_string()]);
        assert_eq!(err.errors.len(), 1);
        assert!(err.to_string().contains("Retry: max_retry_attempts"));
    }
}
