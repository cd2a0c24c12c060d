//! Telemetry event records.

use crate::errors::ErrorKind;
use crate::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Names of the events reported by the built-in strategies.
pub mod names {
    /// A pipeline execution is starting.
    pub const PIPELINE_EXECUTING: &str = "PipelineExecuting";
    /// A pipeline execution finished.
    pub const PIPELINE_EXECUTED: &str = "PipelineExecuted";
    /// One attempt of a retry or hedging strategy finished.
    pub const EXECUTION_ATTEMPT: &str = "ExecutionAttempt";
    /// The retry strategy is about to retry.
    pub const ON_RETRY: &str = "OnRetry";
    /// The circuit opened.
    pub const ON_CIRCUIT_OPENED: &str = "OnCircuitOpened";
    /// The circuit closed.
    pub const ON_CIRCUIT_CLOSED: &str = "OnCircuitClosed";
    /// The circuit admitted a probe.
    pub const ON_CIRCUIT_HALF_OPENED: &str = "OnCircuitHalfOpened";
    /// The timeout strategy cancelled an execution.
    pub const ON_TIMEOUT: &str = "OnTimeout";
    /// The fallback strategy substituted an outcome.
    pub const ON_FALLBACK: &str = "OnFallback";
    /// The hedging strategy launched a hedged attempt.
    pub const ON_HEDGING: &str = "OnHedging";
    /// The concurrency limiter rejected an execution.
    pub const ON_RATE_LIMITER_REJECTED: &str = "OnRateLimiterRejected";
}

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Not forwarded to sinks; still recorded on the context.
    None,
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Information,
    /// Mitigation happened.
    Warning,
    /// A failure surfaced.
    Error,
}

/// Lightweight record kept on the [`ResilienceContext`](crate::context::ResilienceContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceEvent {
    /// Event name.
    pub name: &'static str,
    /// Event severity.
    pub severity: Severity,
}

impl ResilienceEvent {
    /// Creates a new event record.
    #[must_use]
    pub const fn new(name: &'static str, severity: Severity) -> Self {
        Self { name, severity }
    }
}

/// Full event delivered to [`TelemetrySink`](super::TelemetrySink)s.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// Event name, one of [`names`].
    pub event_name: &'static str,
    /// Severity.
    pub severity: Severity,
    /// Name of the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    /// Instance name of the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_instance: Option<String>,
    /// Name of the reporting strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    /// Operation key of the execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_key: Option<String>,
    /// Execution id of the context.
    pub execution_id: Uuid,
    /// Attempt number, where relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Whether the outcome was handled by the strategy's predicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    /// Outcome summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Failure kind of the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Duration in milliseconds (attempt duration, delay, break or timeout).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// When the event was reported.
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Creates an event with only the mandatory fields.
    #[must_use]
    pub fn new(event_name: &'static str, severity: Severity, execution_id: Uuid) -> Self {
        Self {
            event_name,
            severity,
            pipeline_name: None,
            pipeline_instance: None,
            strategy_name: None,
            operation_key: None,
            execution_id,
            attempt: None,
            handled: None,
            outcome: None,
            error_kind: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Sets the handled flag.
    #[must_use]
    pub const fn with_handled(mut self, handled: bool) -> Self {
        self.handled = Some(handled);
        self
    }

    /// Records an outcome summary.
    #[must_use]
    pub fn with_outcome<T>(mut self, outcome: &Outcome<T>) -> Self {
        self.outcome = Some(outcome.describe());
        self.error_kind = outcome.error_kind();
        self
    }

    /// Records a duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_secs_f64() * 1000.0);
        self
    }

    /// Returns true if this event carries a failed outcome.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error_kind.is_some()
    }
}
