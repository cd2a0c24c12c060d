//! Telemetry sink trait and implementations.

use super::{Severity, TelemetryEvent};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

/// Receives the events reported by resilience strategies.
///
/// Sinks are called synchronously on the executing task, so they must
/// return promptly and must not panic.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Writes one event.
    fn write(&self, event: &TelemetryEvent);
}

/// Sink that drops every event.
///
/// Events are still recorded on the executing context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetrySink;

impl TelemetrySink for NoOpTelemetrySink {
    fn write(&self, _event: &TelemetryEvent) {}
}

/// A sink that logs events using the tracing framework.
///
/// Events map onto tracing levels by severity; events below `minimum` are
/// dropped.
#[derive(Debug, Clone)]
pub struct LoggingTelemetrySink {
    minimum: Severity,
}

impl Default for LoggingTelemetrySink {
    fn default() -> Self {
        Self {
            minimum: Severity::Debug,
        }
    }
}

impl LoggingTelemetrySink {
    /// Creates a sink logging events at or above `minimum`.
    #[must_use]
    pub const fn new(minimum: Severity) -> Self {
        Self { minimum }
    }

    /// Creates a sink that only logs warnings and errors.
    #[must_use]
    pub const fn warnings() -> Self {
        Self::new(Severity::Warning)
    }
}

impl TelemetrySink for LoggingTelemetrySink {
    fn write(&self, event: &TelemetryEvent) {
        if event.severity < self.minimum {
            return;
        }

        macro_rules! log_event {
            ($level:ident) => {
                $level!(
                    event_name = event.event_name,
                    pipeline = event.pipeline_name.as_deref().unwrap_or("-"),
                    strategy = event.strategy_name.as_deref().unwrap_or("-"),
                    operation_key = event.operation_key.as_deref().unwrap_or("-"),
                    attempt = ?event.attempt,
                    handled = ?event.handled,
                    outcome = event.outcome.as_deref().unwrap_or("-"),
                    duration_ms = ?event.duration_ms,
                    "Resilience event: {}",
                    event.event_name
                )
            };
        }

        match event.severity {
            Severity::None => {}
            Severity::Debug => log_event!(debug),
            Severity::Information => log_event!(info),
            Severity::Warning => log_event!(warn),
            Severity::Error => log_event!(error),
        }
    }
}

/// A collecting sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingTelemetrySink {
    events: RwLock<Vec<TelemetryEvent>>,
}

impl CollectingTelemetrySink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Counts events with the given name.
    #[must_use]
    pub fn count(&self, event_name: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_name == event_name)
            .count()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl TelemetrySink for CollectingTelemetrySink {
    fn write(&self, event: &TelemetryEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::names;
    use uuid::Uuid;

    fn event(name: &'static str, severity: Severity) -> TelemetryEvent {
        TelemetryEvent::new(name, severity, Uuid::new_v4())
    }

    #[test]
    fn test_noop_sink() {
        NoOpTelemetrySink.write(&event(names::ON_RETRY, Severity::Warning));
    }

    #[test]
    fn test_logging_sink_all_levels() {
        let sink = LoggingTelemetrySink::default();
        for severity in [
            Severity::None,
            Severity::Debug,
            Severity::Information,
            Severity::Warning,
            Severity::Error,
        ] {
            sink.write(&event(names::ON_TIMEOUT, severity));
        }
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingTelemetrySink::new();
        assert!(sink.is_empty());

        sink.write(&event(names::ON_RETRY, Severity::Warning));
        sink.write(&event(names::ON_RETRY, Severity::Warning));
        sink.write(&event(names::ON_FALLBACK, Severity::Warning));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(names::ON_RETRY), 2);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_mock_sink_expectations() {
        let mut mock = MockTelemetrySink::new();
        mock.expect_write()
            .withf(|e| e.event_name == names::ON_HEDGING)
            .times(1)
            .return_const(());

        mock.write(&event(names::ON_HEDGING, Severity::Warning));
    }
}
