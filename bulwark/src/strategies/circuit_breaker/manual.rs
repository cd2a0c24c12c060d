//! Handles for observing and driving circuit breakers from outside a
//! pipeline.

use super::CircuitState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Operations a breaker exposes to its handles.
pub(crate) trait CircuitControl: Send + Sync {
    fn isolate(&self);
    fn close(&self);
    fn state(&self) -> CircuitState;
}

#[derive(Default)]
struct ManualControlInner {
    breakers: Mutex<Vec<Weak<dyn CircuitControl>>>,
    isolated: AtomicBool,
}

/// Isolates or closes every circuit breaker it is attached to.
///
/// A breaker built while the control is isolated starts in
/// [`CircuitState::Isolated`].
#[derive(Clone, Default)]
pub struct CircuitBreakerManualControl {
    inner: Arc<ManualControlInner>,
}

impl fmt::Debug for CircuitBreakerManualControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerManualControl")
            .field("isolated", &self.is_isolated())
            .field("breakers", &self.inner.breakers.lock().len())
            .finish()
    }
}

impl CircuitBreakerManualControl {
    /// Creates a control attached to no breaker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every attached breaker open until [`close`](Self::close).
    pub fn isolate(&self) {
        self.inner.isolated.store(true, Ordering::SeqCst);
        for breaker in self.live() {
            breaker.isolate();
        }
    }

    /// Closes every attached breaker and resets its metrics.
    pub fn close(&self) {
        self.inner.isolated.store(false, Ordering::SeqCst);
        for breaker in self.live() {
            breaker.close();
        }
    }

    /// Returns true between [`isolate`](Self::isolate) and
    /// [`close`](Self::close).
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.inner.isolated.load(Ordering::SeqCst)
    }

    pub(crate) fn attach(&self, breaker: Weak<dyn CircuitControl>) {
        self.inner.breakers.lock().push(breaker);
    }

    fn live(&self) -> Vec<Arc<dyn CircuitControl>> {
        let mut breakers = self.inner.breakers.lock();
        breakers.retain(|b| b.strong_count() > 0);
        breakers.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Reports the state of the circuit breaker it is attached to.
#[derive(Clone, Default)]
pub struct CircuitBreakerStateProvider {
    breaker: Arc<Mutex<Option<Weak<dyn CircuitControl>>>>,
}

impl fmt::Debug for CircuitBreakerStateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerStateProvider")
            .field("circuit_state", &self.circuit_state())
            .finish()
    }
}

impl CircuitBreakerStateProvider {
    /// Creates a provider attached to no breaker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker's state, or `None` before a pipeline using it is
    /// built and after that pipeline is dropped.
    #[must_use]
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.breaker
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|b| b.state())
    }

    pub(crate) fn attach(&self, breaker: Weak<dyn CircuitControl>) {
        *self.breaker.lock() = Some(breaker);
    }
}
