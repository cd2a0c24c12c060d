//! Aggregate statistics collected from telemetry events.

use super::{names, TelemetryEvent, TelemetrySink};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`TelemetryCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Pipeline executions started.
    pub executions: u64,
    /// Executions that produced a value.
    pub succeeded: u64,
    /// Executions that surfaced a failure.
    pub failed: u64,
    /// Attempts made by retry and hedging strategies.
    pub attempts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Hedged attempts launched.
    pub hedges: u64,
    /// Fallbacks applied.
    pub fallbacks: u64,
    /// Timeouts.
    pub timeouts: u64,
    /// Circuit openings.
    pub circuit_opened: u64,
    /// Circuit closings.
    pub circuit_closed: u64,
    /// Concurrency limiter rejections.
    pub rejections: u64,
}

/// A [`TelemetrySink`] that keeps running totals.
///
/// Inject one into every pipeline whose statistics should be aggregated and
/// poll [`TelemetryCounters::snapshot`] from the presentation layer.
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    executions: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    hedges: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
    circuit_opened: AtomicU64,
    circuit_closed: AtomicU64,
    rejections: AtomicU64,
}

impl TelemetryCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current totals.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            executions: self.executions.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            hedges: self.hedges.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            circuit_opened: self.circuit_opened.load(Ordering::Relaxed),
            circuit_closed: self.circuit_closed.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.executions,
            &self.succeeded,
            &self.failed,
            &self.attempts,
            &self.retries,
            &self.hedges,
            &self.fallbacks,
            &self.timeouts,
            &self.circuit_opened,
            &self.circuit_closed,
            &self.rejections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl TelemetrySink for TelemetryCounters {
    fn write(&self, event: &TelemetryEvent) {
        let counter = match event.event_name {
            names::PIPELINE_EXECUTING => &self.executions,
            names::PIPELINE_EXECUTED if event.is_failure() => &self.failed,
            names::PIPELINE_EXECUTED => &self.succeeded,
            names::EXECUTION_ATTEMPT => &self.attempts,
            names::ON_RETRY => &self.retries,
            names::ON_HEDGING => &self.hedges,
            names::ON_FALLBACK => &self.fallbacks,
            names::ON_TIMEOUT => &self.timeouts,
            names::ON_CIRCUIT_OPENED => &self.circuit_opened,
            names::ON_CIRCUIT_CLOSED => &self.circuit_closed,
            names::ON_RATE_LIMITER_REJECTED => &self.rejections,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResilienceError;
    use crate::telemetry::Severity;
    use crate::Outcome;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn event(name: &'static str) -> TelemetryEvent {
        TelemetryEvent::new(name, Severity::Information, Uuid::new_v4())
    }

    #[test]
    fn test_counts_by_event_name() {
        let counters = TelemetryCounters::new();
        counters.write(&event(names::PIPELINE_EXECUTING));
        counters.write(&event(names::PIPELINE_EXECUTED).with_outcome(&Outcome::value(1)));
        counters.write(&event(names::PIPELINE_EXECUTING));
        counters.write(
            &event(names::PIPELINE_EXECUTED)
                .with_outcome::<()>(&Outcome::error(ResilienceError::IsolatedCircuit)),
        );
        counters.write(&event(names::ON_RETRY));
        counters.write(&event(names::ON_RETRY));
        counters.write(&event(names::ON_CIRCUIT_HALF_OPENED));

        assert_eq!(
            counters.snapshot(),
            CounterSnapshot {
                executions: 2,
                succeeded: 1,
                failed: 1,
                retries: 2,
                ..CounterSnapshot::default()
            }
        );
    }

    #[test]
    fn test_reset() {
        let counters = TelemetryCounters::new();
        counters.write(&event(names::ON_TIMEOUT));
        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
