//! Predicates deciding which outcomes a strategy handles.
//!
//! Every strategy consults a [`ShouldHandle`] predicate to decide whether an
//! [`Outcome`] is eligible for mitigation (retry, fallback, breaking,
//! hedging). Predicates are composable and cheap to clone.

use crate::errors::{ErrorKind, ResilienceError};
use crate::Outcome;
use std::fmt;
use std::sync::Arc;

type PredicateFn<T> = Arc<dyn Fn(&Outcome<T>) -> bool + Send + Sync>;

/// A composable predicate over [`Outcome`]s.
pub struct ShouldHandle<T> {
    predicate: PredicateFn<T>,
}

impl<T> Clone for ShouldHandle<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for ShouldHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShouldHandle")
    }
}

impl<T: 'static> ShouldHandle<T> {
    /// Wraps a closure.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Handles every failure except cancellation.
    #[must_use]
    pub fn any_error() -> Self {
        Self::new(|outcome| {
            outcome
                .as_error()
                .is_some_and(|error| !error.is_cancelled())
        })
    }

    /// Handles nothing.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    /// Handles every outcome, values included.
    #[must_use]
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Evaluates the predicate.
    pub fn handles(&self, outcome: &Outcome<T>) -> bool {
        (self.predicate)(outcome)
    }

    /// Handles what either predicate handles.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::new(move |outcome| self.handles(outcome) || other.handles(outcome))
    }

    /// Handles what both predicates handle.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::new(move |outcome| self.handles(outcome) && other.handles(outcome))
    }

    /// Inverts the predicate.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::new(move |outcome| !self.handles(outcome))
    }
}

impl<T: 'static> Default for ShouldHandle<T> {
    fn default() -> Self {
        Self::any_error()
    }
}

/// Accumulates alternatives into a [`ShouldHandle`].
///
/// The built predicate handles an outcome when any registered alternative
/// does. A builder with no alternatives handles nothing.
///
/// ```
/// use bulwark::predicate::PredicateBuilder;
/// use bulwark::{ErrorKind, Outcome};
///
/// let should_handle = PredicateBuilder::<u16>::new()
///     .handle::<std::io::Error>()
///     .handle_kind(ErrorKind::Timeout)
///     .handle_result(|status| *status >= 500)
///     .build();
///
/// assert!(should_handle.handles(&Outcome::value(503)));
/// assert!(!should_handle.handles(&Outcome::value(200)));
/// ```
pub struct PredicateBuilder<T> {
    alternatives: Vec<PredicateFn<T>>,
}

impl<T: 'static> PredicateBuilder<T> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alternatives: Vec::new(),
        }
    }

    fn push<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.alternatives.push(Arc::new(predicate));
        self
    }

    /// Handles user failures whose concrete error type is `E`.
    #[must_use]
    pub fn handle<E>(self) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.push(|outcome| outcome.as_error().is_some_and(ResilienceError::is::<E>))
    }

    /// Handles user failures of type `E` matching `predicate`.
    #[must_use]
    pub fn handle_where<E, F>(self, predicate: F) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.push(move |outcome| {
            outcome
                .as_error()
                .and_then(ResilienceError::downcast_ref::<E>)
                .is_some_and(&predicate)
        })
    }

    /// Handles failures of the given kind.
    #[must_use]
    pub fn handle_kind(self, kind: ErrorKind) -> Self {
        self.push(move |outcome| outcome.error_kind() == Some(kind))
    }

    /// Handles values matching `predicate`.
    #[must_use]
    pub fn handle_result<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.push(move |outcome| outcome.as_value().is_some_and(&predicate))
    }

    /// Handles values equal to `expected`.
    #[must_use]
    pub fn handle_result_eq(self, expected: T) -> Self
    where
        T: PartialEq + Send + Sync,
    {
        self.push(move |outcome| outcome.as_value() == Some(&expected))
    }

    /// Builds the predicate.
    #[must_use]
    pub fn build(self) -> ShouldHandle<T> {
        let alternatives = self.alternatives;
        ShouldHandle::new(move |outcome| alternatives.iter().any(|p| p(outcome)))
    }
}

impl<T: 'static> Default for PredicateBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> From<PredicateBuilder<T>> for ShouldHandle<T> {
    fn from(builder: PredicateBuilder<T>) -> Self {
        builder.build()
    }
}
