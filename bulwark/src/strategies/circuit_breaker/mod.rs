//! Circuit breaker strategy.
//!
//! Samples outcomes over a rolling window and, once the failure ratio
//! crosses its threshold with enough throughput, fails calls fast for a
//! break period before admitting a single probe:
//!
//! ```text
//! Closed --(ratio >= failure_ratio, throughput >= minimum)--> Open
//! Open --(break elapsed, next call admitted)--> HalfOpen
//! HalfOpen --(probe not handled)--> Closed
//! HalfOpen --(probe handled)--> Open
//! any --(manual isolate)--> Isolated --(manual close)--> Closed
//! ```
//!
//! Breaker state is shared by every execution of the pipeline that owns it.

mod controller;
mod health;
mod manual;

pub use controller::CircuitState;
pub use manual::{CircuitBreakerManualControl, CircuitBreakerStateProvider};

use crate::context::ResilienceContext;
use crate::pipeline::{Next, ResilienceStrategy};
use crate::predicate::ShouldHandle;
use crate::telemetry::StrategyTelemetry;
use crate::Outcome;
use async_trait::async_trait;
use controller::CircuitController;
use manual::CircuitControl;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shortest accepted sampling window and break.
pub const MIN_BREAK_DURATION: Duration = Duration::from_millis(500);

/// Longest break a generator may request.
pub const MAX_BREAK_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Arguments passed to [`CircuitBreakerStrategyOptions::on_opened`].
#[derive(Debug)]
pub struct OnCircuitOpenedArguments<'a, T> {
    /// Context of the execution that tripped the breaker, or a fresh one
    /// for manual transitions.
    pub context: &'a ResilienceContext,
    /// The outcome that tripped the breaker; `None` for manual isolation.
    pub outcome: Option<&'a Outcome<T>>,
    /// How long calls will fail fast.
    pub break_duration: Duration,
    /// True when opened by [`CircuitBreakerManualControl::isolate`].
    pub is_manual: bool,
}

/// Arguments passed to [`CircuitBreakerStrategyOptions::on_closed`].
#[derive(Debug)]
pub struct OnCircuitClosedArguments<'a, T> {
    /// Context of the probe execution, or a fresh one for manual closes.
    pub context: &'a ResilienceContext,
    /// The probe outcome; `None` for manual closes.
    pub outcome: Option<&'a Outcome<T>>,
    /// True when closed by [`CircuitBreakerManualControl::close`].
    pub is_manual: bool,
}

/// Arguments passed to [`CircuitBreakerStrategyOptions::on_half_opened`].
#[derive(Debug)]
pub struct OnCircuitHalfOpenedArguments<'a> {
    /// Context of the probe execution.
    pub context: &'a ResilienceContext,
}

/// Arguments passed to the break duration generator.
#[derive(Debug)]
pub struct BreakDurationGeneratorArguments<'a> {
    /// Failure rate over the sampling window.
    pub failure_rate: f64,
    /// Failures over the sampling window.
    pub failure_count: u32,
    /// Consecutive failed probes.
    pub half_open_attempts: u32,
    /// Context of the execution that tripped the breaker.
    pub context: &'a ResilienceContext,
}

/// Hook invoked when the circuit opens.
pub type OnCircuitOpened<T> = Arc<dyn Fn(&OnCircuitOpenedArguments<'_, T>) + Send + Sync>;

/// Hook invoked when the circuit closes.
pub type OnCircuitClosed<T> = Arc<dyn Fn(&OnCircuitClosedArguments<'_, T>) + Send + Sync>;

/// Hook invoked when the circuit half-opens.
pub type OnCircuitHalfOpened = Arc<dyn Fn(&OnCircuitHalfOpenedArguments<'_>) + Send + Sync>;

/// Chooses the break of each opening.
pub type BreakDurationGenerator =
    Arc<dyn Fn(&BreakDurationGeneratorArguments<'_>) -> Duration + Send + Sync>;

/// Options of the circuit breaker strategy.
pub struct CircuitBreakerStrategyOptions<T> {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// Failure ratio that opens the circuit, in `(0, 1]`.
    pub failure_ratio: f64,
    /// Calls the window must hold before the ratio is considered.
    pub minimum_throughput: u32,
    /// Length of the rolling window.
    pub sampling_duration: Duration,
    /// How long the circuit stays open.
    pub break_duration: Duration,
    /// Per-opening break override.
    pub break_duration_generator: Option<BreakDurationGenerator>,
    /// Outcomes counted as failures.
    pub should_handle: ShouldHandle<T>,
    /// Hook invoked when the circuit opens.
    pub on_opened: Option<OnCircuitOpened<T>>,
    /// Hook invoked when the circuit closes.
    pub on_closed: Option<OnCircuitClosed<T>>,
    /// Hook invoked when the circuit half-opens.
    pub on_half_opened: Option<OnCircuitHalfOpened>,
    /// Manual control to attach the breaker to.
    pub manual_control: Option<CircuitBreakerManualControl>,
    /// State provider to attach the breaker to.
    pub state_provider: Option<CircuitBreakerStateProvider>,
}

impl<T: 'static> Default for CircuitBreakerStrategyOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            failure_ratio: 0.1,
            minimum_throughput: 100,
            sampling_duration: Duration::from_secs(30),
            break_duration: Duration::from_secs(5),
            break_duration_generator: None,
            should_handle: ShouldHandle::default(),
            on_opened: None,
            on_closed: None,
            on_half_opened: None,
            manual_control: None,
            state_provider: None,
        }
    }
}

impl<T> Clone for CircuitBreakerStrategyOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            failure_ratio: self.failure_ratio,
            minimum_throughput: self.minimum_throughput,
            sampling_duration: self.sampling_duration,
            break_duration: self.break_duration,
            break_duration_generator: self.break_duration_generator.clone(),
            should_handle: self.should_handle.clone(),
            on_opened: self.on_opened.clone(),
            on_closed: self.on_closed.clone(),
            on_half_opened: self.on_half_opened.clone(),
            manual_control: self.manual_control.clone(),
            state_provider: self.state_provider.clone(),
        }
    }
}

impl<T> fmt::Debug for CircuitBreakerStrategyOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerStrategyOptions")
            .field("name", &self.name)
            .field("failure_ratio", &self.failure_ratio)
            .field("minimum_throughput", &self.minimum_throughput)
            .field("sampling_duration", &self.sampling_duration)
            .field("break_duration", &self.break_duration)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> CircuitBreakerStrategyOptions<T> {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the failure ratio.
    #[must_use]
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Sets the minimum throughput.
    #[must_use]
    pub fn with_minimum_throughput(mut self, throughput: u32) -> Self {
        self.minimum_throughput = throughput;
        self
    }

    /// Sets the sampling window.
    #[must_use]
    pub fn with_sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = duration;
        self
    }

    /// Sets the break.
    #[must_use]
    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Sets a per-opening break source.
    #[must_use]
    pub fn with_break_duration_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&BreakDurationGeneratorArguments<'_>) -> Duration + Send + Sync + 'static,
    {
        self.break_duration_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_should_handle(mut self, should_handle: impl Into<ShouldHandle<T>>) -> Self {
        self.should_handle = should_handle.into();
        self
    }

    /// Sets the opened hook.
    #[must_use]
    pub fn with_on_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OnCircuitOpenedArguments<'_, T>) + Send + Sync + 'static,
    {
        self.on_opened = Some(Arc::new(hook));
        self
    }

    /// Sets the closed hook.
    #[must_use]
    pub fn with_on_closed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OnCircuitClosedArguments<'_, T>) + Send + Sync + 'static,
    {
        self.on_closed = Some(Arc::new(hook));
        self
    }

    /// Sets the half-opened hook.
    #[must_use]
    pub fn with_on_half_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OnCircuitHalfOpenedArguments<'_>) + Send + Sync + 'static,
    {
        self.on_half_opened = Some(Arc::new(hook));
        self
    }

    /// Attaches a manual control.
    #[must_use]
    pub fn with_manual_control(mut self, control: CircuitBreakerManualControl) -> Self {
        self.manual_control = Some(control);
        self
    }

    /// Attaches a state provider.
    #[must_use]
    pub fn with_state_provider(mut self, provider: CircuitBreakerStateProvider) -> Self {
        self.state_provider = Some(provider);
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            errors.push(format!(
                "failure_ratio must be in (0, 1], got {}",
                self.failure_ratio
            ));
        }
        if self.minimum_throughput < 2 {
            errors.push(format!(
                "minimum_throughput must be at least 2, got {}",
                self.minimum_throughput
            ));
        }
        if self.sampling_duration < MIN_BREAK_DURATION {
            errors.push(format!(
                "sampling_duration must be at least {MIN_BREAK_DURATION:?}, got {:?}",
                self.sampling_duration
            ));
        }
        if self.break_duration < MIN_BREAK_DURATION || self.break_duration > MAX_BREAK_DURATION {
            errors.push(format!(
                "break_duration must be between {MIN_BREAK_DURATION:?} and {MAX_BREAK_DURATION:?}, got {:?}",
                self.break_duration
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// The circuit breaker strategy.
pub struct CircuitBreakerStrategy<T> {
    controller: Arc<CircuitController<T>>,
    should_handle: ShouldHandle<T>,
}

impl<T> fmt::Debug for CircuitBreakerStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerStrategy")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> CircuitBreakerStrategy<T> {
    pub(crate) fn new(options: CircuitBreakerStrategyOptions<T>, telemetry: StrategyTelemetry) -> Self {
        let isolated = options
            .manual_control
            .as_ref()
            .is_some_and(CircuitBreakerManualControl::is_isolated);
        let should_handle = options.should_handle.clone();
        let manual_control = options.manual_control.clone();
        let state_provider = options.state_provider.clone();
        let controller = Arc::new(CircuitController::new(options, telemetry, isolated));

        let breaker: Arc<dyn CircuitControl> = controller.clone();
        let handle = Arc::downgrade(&breaker);
        if let Some(control) = manual_control {
            control.attach(handle.clone());
        }
        if let Some(provider) = state_provider {
            provider.attach(handle);
        }

        Self {
            controller,
            should_handle,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.controller.circuit_state()
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for CircuitBreakerStrategy<T> {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        if let Err(rejection) = self.controller.before_execute(ctx) {
            return Outcome::error(rejection);
        }
        let outcome = next.run(ctx).await;
        let handled = self.should_handle.handles(&outcome);
        self.controller.after_execute(ctx, &outcome, handled);
        outcome
    }
}
