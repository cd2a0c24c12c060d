//! Pipeline builder with validation.

use super::{AnyResult, ResiliencePipeline, ResilienceStrategy};
use crate::errors::PipelineValidationError;
use crate::strategies::{
    CircuitBreakerStrategy, CircuitBreakerStrategyOptions, ConcurrencyLimiterOptions,
    ConcurrencyLimiterStrategy, FallbackStrategy, FallbackStrategyOptions, HedgingStrategy,
    HedgingStrategyOptions, RetryStrategy, RetryStrategyOptions, TimeoutStrategy,
    TimeoutStrategyOptions,
};
use crate::telemetry::{LoggingTelemetrySink, StrategyTelemetry, TelemetrySink, TelemetrySinks};
use std::fmt;
use std::sync::Arc;

type StrategyFactory<T> =
    Box<dyn FnOnce(StrategyTelemetry) -> Option<Arc<dyn ResilienceStrategy<T>>> + Send>;

/// A strategy waiting for [`ResiliencePipelineBuilder::build`].
struct PendingStrategy<T: Send + 'static> {
    kind: &'static str,
    name: Option<String>,
    errors: Vec<String>,
    factory: StrategyFactory<T>,
}

impl<T: Send + 'static> PendingStrategy<T> {
    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.to_string())
    }
}

/// Builder for creating validated pipelines.
///
/// Strategies run in the order they are added: the first one added is the
/// outermost and sees the caller's call first, the last one added wraps the
/// callable directly.
///
/// ```
/// use bulwark::strategies::RetryStrategyOptions;
/// use bulwark::ResiliencePipelineBuilder;
/// use std::time::Duration;
///
/// let pipeline = ResiliencePipelineBuilder::<String>::new()
///     .with_name("profile-service")
///     .add_retry(RetryStrategyOptions::new().with_max_retry_attempts(2))
///     .add_timeout(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(pipeline.strategy_count(), 2);
/// ```
pub struct ResiliencePipelineBuilder<T: Send + 'static> {
    name: Option<String>,
    instance_name: Option<String>,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    strategies: Vec<PendingStrategy<T>>,
}

impl<T: Send + 'static> fmt::Debug for ResiliencePipelineBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePipelineBuilder")
            .field("name", &self.name)
            .field("instance_name", &self.instance_name)
            .field("sinks", &self.sinks.len())
            .field(
                "strategies",
                &self.strategies.iter().map(PendingStrategy::label).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Send + 'static> Default for ResiliencePipelineBuilder<T> {
    fn default() -> Self {
        Self {
            name: None,
            instance_name: None,
            sinks: Vec::new(),
            strategies: Vec::new(),
        }
    }
}

impl ResiliencePipelineBuilder<AnyResult> {
    /// Creates a builder for an untyped pipeline.
    ///
    /// Predicates and fallback values of an untyped pipeline see the boxed
    /// result; use [`ResiliencePipeline::execute_any`] to run callables of
    /// any result type through it.
    #[must_use]
    pub fn untyped() -> Self {
        Self::default()
    }
}

impl<T: Send + 'static> ResiliencePipelineBuilder<T> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name reported in telemetry.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the pipeline instance name reported in telemetry.
    #[must_use]
    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Adds a telemetry sink.
    ///
    /// Without any sink, events are logged through `tracing`.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Adds a retry strategy.
    #[must_use]
    pub fn add_retry(self, options: RetryStrategyOptions<T>) -> Self {
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("Retry", name, errors, move |telemetry| {
            Some(Arc::new(RetryStrategy::new(options, telemetry)))
        })
    }

    /// Adds a circuit breaker.
    ///
    /// The breaker's state lives as long as the built pipeline.
    #[must_use]
    pub fn add_circuit_breaker(self, options: CircuitBreakerStrategyOptions<T>) -> Self {
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("CircuitBreaker", name, errors, move |telemetry| {
            Some(Arc::new(CircuitBreakerStrategy::new(options, telemetry)))
        })
    }

    /// Adds a timeout; accepts options or a plain [`Duration`](std::time::Duration).
    #[must_use]
    pub fn add_timeout(self, options: impl Into<TimeoutStrategyOptions>) -> Self {
        let options = options.into();
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("Timeout", name, errors, move |telemetry| {
            Some(Arc::new(TimeoutStrategy::new(options, telemetry)))
        })
    }

    /// Adds a fallback.
    #[must_use]
    pub fn add_fallback(self, options: FallbackStrategyOptions<T>) -> Self {
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("Fallback", name, errors, move |telemetry| {
            FallbackStrategy::new(options, telemetry)
                .map(|strategy| Arc::new(strategy) as Arc<dyn ResilienceStrategy<T>>)
        })
    }

    /// Adds a hedging strategy.
    #[must_use]
    pub fn add_hedging(self, options: HedgingStrategyOptions<T>) -> Self {
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("Hedging", name, errors, move |telemetry| {
            Some(Arc::new(HedgingStrategy::new(options, telemetry)))
        })
    }

    /// Adds a concurrency limiter.
    #[must_use]
    pub fn add_concurrency_limiter(self, options: ConcurrencyLimiterOptions) -> Self {
        let errors = options.validate().err().unwrap_or_default();
        let name = options.name.clone();
        self.push("ConcurrencyLimiter", name, errors, move |telemetry| {
            Some(Arc::new(ConcurrencyLimiterStrategy::new(options, telemetry)))
        })
    }

    /// Adds a custom strategy.
    #[must_use]
    pub fn add_strategy(self, strategy: Arc<dyn ResilienceStrategy<T>>) -> Self {
        self.push("Custom", None, Vec::new(), move |_| Some(strategy))
    }

    /// Returns the number of strategies added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategy was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    fn push<F>(mut self, kind: &'static str, name: Option<String>, errors: Vec<String>, factory: F) -> Self
    where
        F: FnOnce(StrategyTelemetry) -> Option<Arc<dyn ResilienceStrategy<T>>> + Send + 'static,
    {
        self.strategies.push(PendingStrategy {
            kind,
            name,
            errors,
            factory: Box::new(factory),
        });
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns every validation failure of every added strategy at once.
    pub fn build(self) -> Result<ResiliencePipeline<T>, PipelineValidationError> {
        let failures: Vec<(String, Vec<String>)> = self
            .strategies
            .iter()
            .filter(|pending| !pending.errors.is_empty())
            .map(|pending| (pending.label(), pending.errors.clone()))
            .collect();
        if !failures.is_empty() {
            return Err(PipelineValidationError::from_failures(failures));
        }

        let sinks: TelemetrySinks = if self.sinks.is_empty() {
            Arc::from(vec![
                Arc::new(LoggingTelemetrySink::default()) as Arc<dyn TelemetrySink>
            ])
        } else {
            Arc::from(self.sinks)
        };

        let mut strategies = Vec::with_capacity(self.strategies.len());
        for pending in self.strategies {
            let label = pending.label();
            let telemetry = StrategyTelemetry::new(
                self.name.clone(),
                self.instance_name.clone(),
                Some(label.clone()),
                Arc::clone(&sinks),
            );
            match (pending.factory)(telemetry) {
                Some(strategy) => strategies.push(strategy),
                None => {
                    return Err(PipelineValidationError::from_failures(vec![(
                        label,
                        vec!["strategy could not be created".to_string()],
                    )]))
                }
            }
        }

        let telemetry = StrategyTelemetry::new(self.name.clone(), self.instance_name, None, sinks);
        Ok(ResiliencePipeline::new(self.name, strategies, telemetry))
    }
}
