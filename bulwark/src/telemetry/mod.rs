//! Telemetry for resilience strategies.
//!
//! Strategies report [`TelemetryEvent`]s through a [`StrategyTelemetry`]
//! handle. Every report is recorded on the executing
//! [`ResilienceContext`](crate::context::ResilienceContext) and, unless its
//! severity is [`Severity::None`], delivered to each configured
//! [`TelemetrySink`].

mod counters;
mod event;
mod sink;

pub use counters::{CounterSnapshot, TelemetryCounters};
pub use event::{names, ResilienceEvent, Severity, TelemetryEvent};
pub use sink::{CollectingTelemetrySink, LoggingTelemetrySink, NoOpTelemetrySink, TelemetrySink};

#[cfg(test)]
pub use sink::MockTelemetrySink;

use crate::context::ResilienceContext;
use std::sync::Arc;

/// Shared list of sinks.
pub type TelemetrySinks = Arc<[Arc<dyn TelemetrySink>]>;

/// Per-strategy telemetry handle.
///
/// Cheap to clone; carries the names that identify the reporting strategy
/// and the pipeline it belongs to.
#[derive(Clone)]
pub struct StrategyTelemetry {
    pipeline_name: Option<String>,
    pipeline_instance: Option<String>,
    strategy_name: Option<String>,
    sinks: TelemetrySinks,
}

impl StrategyTelemetry {
    /// Creates a telemetry handle.
    #[must_use]
    pub fn new(
        pipeline_name: Option<String>,
        pipeline_instance: Option<String>,
        strategy_name: Option<String>,
        sinks: TelemetrySinks,
    ) -> Self {
        Self {
            pipeline_name,
            pipeline_instance,
            strategy_name,
            sinks,
        }
    }

    /// A handle that records events on the context only.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, None, None, Arc::from(Vec::new()))
    }

    /// Returns the strategy name.
    #[must_use]
    pub fn strategy_name(&self) -> Option<&str> {
        self.strategy_name.as_deref()
    }

    /// Returns true if at least one sink is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Creates an event prefilled with the names of this handle and the
    /// identity of the executing context.
    #[must_use]
    pub fn event(
        &self,
        ctx: &ResilienceContext,
        event_name: &'static str,
        severity: Severity,
    ) -> TelemetryEvent {
        let mut event = TelemetryEvent::new(event_name, severity, ctx.execution_id());
        event.pipeline_name.clone_from(&self.pipeline_name);
        event.pipeline_instance.clone_from(&self.pipeline_instance);
        event.strategy_name.clone_from(&self.strategy_name);
        event.operation_key = ctx.operation_key().map(str::to_string);
        event
    }

    /// Records `event` on the context and writes it to every sink.
    pub fn report(&self, ctx: &mut ResilienceContext, event: TelemetryEvent) {
        ctx.add_event(ResilienceEvent::new(event.event_name, event.severity));
        if event.severity == Severity::None {
            return;
        }
        for sink in self.sinks.iter() {
            sink.write(&event);
        }
    }
}

impl std::fmt::Debug for StrategyTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyTelemetry")
            .field("pipeline_name", &self.pipeline_name)
            .field("pipeline_instance", &self.pipeline_instance)
            .field("strategy_name", &self.strategy_name)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
