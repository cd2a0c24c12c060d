//! Declarative pipeline configuration.
//!
//! A [`PipelineConfig`] describes a pipeline as plain data so it can live in
//! a JSON file next to the service it protects:
//!
//! ```json
//! {
//!   "name": "catalog",
//!   "strategies": [
//!     { "type": "retry", "max_retry_attempts": 4, "delay_ms": 100, "backoff": "exponential" },
//!     { "type": "circuit_breaker", "failure_ratio": 0.5, "minimum_throughput": 20 },
//!     { "type": "timeout", "timeout_ms": 1500 }
//!   ]
//! }
//! ```
//!
//! Settings left out fall back to the defaults of the matching options type.
//! Fallback has no configuration form because it needs an action; add it in
//! code after [`PipelineConfig::apply`].

use crate::errors::{ConfigError, PipelineValidationError};
use crate::pipeline::{ResiliencePipeline, ResiliencePipelineBuilder};
use crate::strategies::{
    BackoffType, CircuitBreakerStrategyOptions, ConcurrencyLimiterOptions, HedgingDelay,
    HedgingStrategyOptions, JitterStrategy, RetryStrategyOptions, TimeoutStrategyOptions,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Plain-data description of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name used in telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Instance name used in telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    /// Strategies, outermost first.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// One configured strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// See [`RetryStrategyOptions`].
    Retry(RetryConfig),
    /// See [`CircuitBreakerStrategyOptions`].
    CircuitBreaker(CircuitBreakerConfig),
    /// See [`TimeoutStrategyOptions`].
    Timeout(TimeoutConfig),
    /// See [`HedgingStrategyOptions`].
    Hedging(HedgingConfig),
    /// See [`ConcurrencyLimiterOptions`].
    ConcurrencyLimiter(ConcurrencyLimiterConfig),
}

/// Retry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Name reported in telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Retries after the first attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retry_attempts: Option<u32>,
    /// Retry until success or cancellation; overrides `max_retry_attempts`.
    pub unbounded: bool,
    /// Base delay in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Backoff family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffType>,
    /// Jitter applied to each delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<JitterStrategy>,
    /// Upper bound on any single delay in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Name reported in telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Handled ratio that opens the circuit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_ratio: Option<f64>,
    /// Calls needed in the window before the ratio counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_throughput: Option<u32>,
    /// Window length in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_duration_ms: Option<u64>,
    /// Time the circuit stays open in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration_ms: Option<u64>,
}

/// Timeout settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Name reported in telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Deadline in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Hedging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HedgingConfig {
    /// Name reported in telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Attempts issued on top of the primary one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hedged_attempts: Option<u32>,
    /// Positive: latency mode. Zero: parallel. Negative: hedge on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<i64>,
}

impl HedgingConfig {
    /// Returns the hedging delay selected by `delay_ms`.
    #[must_use]
    pub fn delay(&self) -> HedgingDelay {
        match self.delay_ms {
            None => HedgingDelay::default(),
            Some(ms) if ms < 0 => HedgingDelay::OnFailure,
            Some(ms) => Duration::from_millis(ms.unsigned_abs()).into(),
        }
    }
}

/// Concurrency limiter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyLimiterConfig {
    /// Name reported in telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Concurrent executions allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit_limit: Option<usize>,
    /// Executions allowed to wait for a permit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_limit: Option<usize>,
}

impl PipelineConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, unknown strategy
    /// types or unknown fields.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        debug!(
            path = %path.display(),
            strategies = config.strategies.len(),
            "Loaded pipeline configuration"
        );
        Ok(config)
    }

    /// Serializes the configuration to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Adds the configured name and strategies to `builder`.
    ///
    /// Values are checked when the builder is built, like options added in
    /// code.
    #[must_use]
    pub fn apply<T: Send + 'static>(
        &self,
        builder: ResiliencePipelineBuilder<T>,
    ) -> ResiliencePipelineBuilder<T> {
        let mut builder = builder;
        if let Some(name) = &self.name {
            builder = builder.with_name(name.clone());
        }
        if let Some(instance) = &self.instance_name {
            builder = builder.with_instance_name(instance.clone());
        }
        self.strategies
            .iter()
            .fold(builder, |builder, strategy| strategy.apply(builder))
    }

    /// Builds a pipeline from this configuration alone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineValidationError`] if any configured value is out of
    /// range.
    pub fn build<T: Send + 'static>(&self) -> Result<ResiliencePipeline<T>, PipelineValidationError> {
        self.apply(ResiliencePipelineBuilder::new()).build()
    }
}

impl StrategyConfig {
    fn apply<T: Send + 'static>(
        &self,
        builder: ResiliencePipelineBuilder<T>,
    ) -> ResiliencePipelineBuilder<T> {
        match self {
            Self::Retry(config) => builder.add_retry(config.options()),
            Self::CircuitBreaker(config) => builder.add_circuit_breaker(config.options()),
            Self::Timeout(config) => builder.add_timeout(config.options()),
            Self::Hedging(config) => builder.add_hedging(config.options()),
            Self::ConcurrencyLimiter(config) => builder.add_concurrency_limiter(config.options()),
        }
    }
}

impl RetryConfig {
    fn options<T: 'static>(&self) -> RetryStrategyOptions<T> {
        let mut options = if self.unbounded {
            RetryStrategyOptions::unbounded()
        } else {
            RetryStrategyOptions::new()
        };
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        if let (Some(attempts), false) = (self.max_retry_attempts, self.unbounded) {
            options = options.with_max_retry_attempts(attempts);
        }
        if let Some(ms) = self.delay_ms {
            options = options.with_delay(Duration::from_millis(ms));
        }
        if let Some(backoff) = self.backoff {
            options = options.with_backoff(backoff);
        }
        if let Some(jitter) = self.jitter {
            options = options.with_jitter(jitter);
        }
        if let Some(ms) = self.max_delay_ms {
            options = options.with_max_delay(Duration::from_millis(ms));
        }
        options
    }
}

impl CircuitBreakerConfig {
    fn options<T: 'static>(&self) -> CircuitBreakerStrategyOptions<T> {
        let mut options = CircuitBreakerStrategyOptions::new();
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        if let Some(ratio) = self.failure_ratio {
            options = options.with_failure_ratio(ratio);
        }
        if let Some(throughput) = self.minimum_throughput {
            options = options.with_minimum_throughput(throughput);
        }
        if let Some(ms) = self.sampling_duration_ms {
            options = options.with_sampling_duration(Duration::from_millis(ms));
        }
        if let Some(ms) = self.break_duration_ms {
            options = options.with_break_duration(Duration::from_millis(ms));
        }
        options
    }
}

impl TimeoutConfig {
    fn options(&self) -> TimeoutStrategyOptions {
        let mut options = self
            .timeout_ms
            .map_or_else(TimeoutStrategyOptions::default, |ms| {
                TimeoutStrategyOptions::new(Duration::from_millis(ms))
            });
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        options
    }
}

impl HedgingConfig {
    fn options<T: 'static>(&self) -> HedgingStrategyOptions<T> {
        let mut options = HedgingStrategyOptions::new().with_delay(self.delay());
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        if let Some(attempts) = self.max_hedged_attempts {
            options = options.with_max_hedged_attempts(attempts);
        }
        options
    }
}

impl ConcurrencyLimiterConfig {
    fn options(&self) -> ConcurrencyLimiterOptions {
        let defaults = ConcurrencyLimiterOptions::default();
        let mut options = ConcurrencyLimiterOptions::new(
            self.permit_limit.unwrap_or(defaults.permit_limit),
            self.queue_limit.unwrap_or(defaults.queue_limit),
        );
        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        options
    }
}
