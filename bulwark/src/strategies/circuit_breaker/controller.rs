//! Circuit breaker state machine.
//!
//! All state lives behind one mutex per breaker. Transitions are decided
//! under the lock; hooks, telemetry and logging run after it is released.

use super::health::{HealthInfo, HealthMetrics};
use super::manual::CircuitControl;
use super::{
    BreakDurationGeneratorArguments, CircuitBreakerStrategyOptions, OnCircuitClosedArguments,
    OnCircuitHalfOpenedArguments, OnCircuitOpenedArguments, MAX_BREAK_DURATION,
};
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow and outcomes are sampled.
    Closed,
    /// Calls fail fast until the break elapses.
    Open,
    /// One probe call decides between closing and re-opening.
    HalfOpen,
    /// Held open by a manual control.
    Isolated,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
            Self::Isolated => "isolated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Opened { break_duration: Duration, manual: bool },
    Closed { manual: bool },
    HalfOpened,
}

#[derive(Debug)]
struct BreakerState {
    circuit: CircuitState,
    blocked_until: Option<Instant>,
    break_duration: Duration,
    half_open_attempts: u32,
    metrics: HealthMetrics,
}

pub(crate) struct CircuitController<T> {
    options: CircuitBreakerStrategyOptions<T>,
    telemetry: StrategyTelemetry,
    state: Mutex<BreakerState>,
}

impl<T> fmt::Debug for CircuitController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitController")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> CircuitController<T> {
    pub(crate) fn new(
        options: CircuitBreakerStrategyOptions<T>,
        telemetry: StrategyTelemetry,
        isolated: bool,
    ) -> Self {
        let state = BreakerState {
            circuit: if isolated {
                CircuitState::Isolated
            } else {
                CircuitState::Closed
            },
            blocked_until: None,
            break_duration: options.break_duration,
            half_open_attempts: 0,
            metrics: HealthMetrics::new(options.sampling_duration),
        };
        Self {
            options,
            telemetry,
            state: Mutex::new(state),
        }
    }

    pub(crate) fn circuit_state(&self) -> CircuitState {
        self.state.lock().circuit
    }

    /// Decides whether a call may run.
    pub(crate) fn before_execute(&self, ctx: &mut ResilienceContext) -> Result<(), ResilienceError> {
        let now = Instant::now();
        let (admitted, transition) = {
            let mut state = self.state.lock();
            let circuit = state.circuit;
            let blocked_until = state.blocked_until;
            match (circuit, blocked_until) {
                (CircuitState::Closed, _) => (Ok(()), None),
                (CircuitState::Isolated, _) => (Err(ResilienceError::IsolatedCircuit), None),
                (_, Some(until)) if now < until => (
                    Err(ResilienceError::BrokenCircuit {
                        retry_after: Some(until - now),
                    }),
                    None,
                ),
                (CircuitState::Open | CircuitState::HalfOpen, _) => {
                    // One probe per break period.
                    state.blocked_until = Some(now + state.break_duration);
                    if circuit == CircuitState::Open {
                        state.circuit = CircuitState::HalfOpen;
                        (Ok(()), Some(Transition::HalfOpened))
                    } else {
                        (Ok(()), None)
                    }
                }
            }
        };
        if let Some(transition) = transition {
            self.notify(ctx, None, transition);
        }
        admitted
    }

    /// Records the outcome of an admitted call.
    pub(crate) fn after_execute(&self, ctx: &mut ResilienceContext, outcome: &Outcome<T>, handled: bool) {
        let now = Instant::now();
        let cancelled = outcome.as_error().is_some_and(ResilienceError::is_cancelled);
        let transition = {
            let mut state = self.state.lock();
            let circuit = state.circuit;
            match (circuit, handled) {
                (CircuitState::HalfOpen, _) if cancelled => {
                    state.blocked_until = Some(now);
                    None
                }
                (_, _) if cancelled => None,
                (CircuitState::HalfOpen, false) => Some(Self::close_circuit(&mut state, false)),
                (CircuitState::HalfOpen, true) => {
                    state.half_open_attempts += 1;
                    let health = state.metrics.health(now);
                    Some(self.open_circuit(&mut state, ctx, health, now))
                }
                (CircuitState::Closed, false) => {
                    state.metrics.record_success(now);
                    None
                }
                (CircuitState::Closed, true) => {
                    state.metrics.record_failure(now);
                    let health = state.metrics.health(now);
                    let tripped = health.throughput >= self.options.minimum_throughput
                        && health.failure_rate >= self.options.failure_ratio;
                    tripped.then(|| self.open_circuit(&mut state, ctx, health, now))
                }
                (CircuitState::Open | CircuitState::Isolated, _) => None,
            }
        };
        if let Some(transition) = transition {
            self.notify(ctx, Some(outcome), transition);
        }
    }

    fn open_circuit(
        &self,
        state: &mut BreakerState,
        ctx: &ResilienceContext,
        health: HealthInfo,
        now: Instant,
    ) -> Transition {
        let break_duration = match &self.options.break_duration_generator {
            Some(generator) => generator(&BreakDurationGeneratorArguments {
                failure_rate: health.failure_rate,
                failure_count: health.failure_count,
                half_open_attempts: state.half_open_attempts,
                context: ctx,
            }),
            None => self.options.break_duration,
        }
        .min(MAX_BREAK_DURATION);
        state.circuit = CircuitState::Open;
        state.break_duration = break_duration;
        state.blocked_until = Some(now + break_duration);
        Transition::Opened {
            break_duration,
            manual: false,
        }
    }

    fn close_circuit(state: &mut BreakerState, manual: bool) -> Transition {
        state.circuit = CircuitState::Closed;
        state.blocked_until = None;
        state.half_open_attempts = 0;
        state.metrics.reset();
        Transition::Closed { manual }
    }

    fn isolate_with(&self, ctx: &mut ResilienceContext) {
        let transition = {
            let mut state = self.state.lock();
            let changed = state.circuit != CircuitState::Isolated;
            state.circuit = CircuitState::Isolated;
            state.blocked_until = None;
            changed.then_some(Transition::Opened {
                break_duration: Duration::MAX,
                manual: true,
            })
        };
        if let Some(transition) = transition {
            self.notify(ctx, None, transition);
        }
    }

    fn close_with(&self, ctx: &mut ResilienceContext) {
        let transition = {
            let mut state = self.state.lock();
            let changed = state.circuit != CircuitState::Closed;
            let transition = Self::close_circuit(&mut state, true);
            changed.then_some(transition)
        };
        if let Some(transition) = transition {
            self.notify(ctx, None, transition);
        }
    }

    fn notify(&self, ctx: &mut ResilienceContext, outcome: Option<&Outcome<T>>, transition: Transition) {
        let strategy = self.telemetry.strategy_name().unwrap_or("CircuitBreaker");
        let event = match transition {
            Transition::Opened {
                break_duration,
                manual,
            } => {
                info!(
                    strategy,
                    break_ms = u64::try_from(break_duration.as_millis()).unwrap_or(u64::MAX),
                    manual,
                    "Circuit opened"
                );
                if let Some(on_opened) = &self.options.on_opened {
                    on_opened(&OnCircuitOpenedArguments {
                        context: ctx,
                        outcome,
                        break_duration,
                        is_manual: manual,
                    });
                }
                self.telemetry
                    .event(ctx, names::ON_CIRCUIT_OPENED, Severity::Error)
                    .with_duration(break_duration)
            }
            Transition::Closed { manual } => {
                info!(strategy, manual, "Circuit closed");
                if let Some(on_closed) = &self.options.on_closed {
                    on_closed(&OnCircuitClosedArguments {
                        context: ctx,
                        outcome,
                        is_manual: manual,
                    });
                }
                self.telemetry
                    .event(ctx, names::ON_CIRCUIT_CLOSED, Severity::Information)
            }
            Transition::HalfOpened => {
                info!(strategy, "Circuit half-opened");
                if let Some(on_half_opened) = &self.options.on_half_opened {
                    on_half_opened(&OnCircuitHalfOpenedArguments { context: ctx });
                }
                self.telemetry
                    .event(ctx, names::ON_CIRCUIT_HALF_OPENED, Severity::Warning)
            }
        };
        let event = match outcome {
            Some(outcome) => event.with_outcome(outcome),
            None => event,
        };
        self.telemetry.report(ctx, event);
    }
}

impl<T: Send + 'static> CircuitControl for CircuitController<T> {
    fn isolate(&self) {
        self.isolate_with(&mut ResilienceContext::new());
    }

    fn close(&self) {
        self.close_with(&mut ResilienceContext::new());
    }

    fn state(&self) -> CircuitState {
        self.circuit_state()
    }
}
