//! # Bulwark
//!
//! Composable resilience pipelines for async Rust.
//!
//! A pipeline wraps a fallible async call in an ordered chain of strategies:
//!
//! - **Retry**: constant, linear or exponential backoff with jitter
//! - **Circuit breaker**: fail fast while a dependency is struggling, with
//!   manual isolation and state inspection
//! - **Timeout**: cooperative deadlines driven by cancellation tokens
//! - **Fallback**: substitute values for handled failures
//! - **Hedging**: race delayed, parallel or failure-triggered attempts
//! - **Concurrency limiter**: bounded permits plus a bounded FIFO queue
//!
//! Every execution carries a pooled [`ResilienceContext`](context::ResilienceContext)
//! with a cancellation token and typed properties. Strategies report
//! [`TelemetryEvent`](telemetry::TelemetryEvent)s to pluggable sinks.
//!
//! ## Quick Start
//!
//! ```rust
//! use bulwark::prelude::*;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let pipeline = ResiliencePipelineBuilder::<u32>::new()
//!     .with_name("inventory")
//!     .add_retry(
//!         RetryStrategyOptions::new()
//!             .with_max_retry_attempts(2)
//!             .with_delay(Duration::from_millis(1)),
//!     )
//!     .add_timeout(Duration::from_secs(1))
//!     .build()?;
//!
//! let outcome = pipeline.execute(|_token| async { Ok::<u32, anyhow::Error>(42) }).await;
//! assert_eq!(outcome.into_result()?, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapter;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod outcome;
pub mod pipeline;
pub mod predicate;
pub mod strategies;
pub mod telemetry;

pub use errors::{ConfigError, ErrorKind, PipelineValidationError, ResilienceError};
pub use outcome::Outcome;
pub use pipeline::{ResiliencePipeline, ResiliencePipelineBuilder, ResiliencePipelineRegistry};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{ExecutionStrategy, NoRetryExecutionStrategy, PipelineExecutionStrategy};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{PipelineConfig, StrategyConfig};
    pub use crate::context::{
        ResilienceContext, ResilienceContextPool, ResiliencePropertyKey, HEDGING_ATTEMPT,
        RETRY_ATTEMPT,
    };
    pub use crate::errors::{ConfigError, ErrorKind, PipelineValidationError, ResilienceError};
    pub use crate::outcome::Outcome;
    pub use crate::pipeline::{
        AnyResult, Next, ResiliencePipeline, ResiliencePipelineBuilder, ResiliencePipelineRegistry,
        ResilienceStrategy,
    };
    pub use crate::predicate::{PredicateBuilder, ShouldHandle};
    pub use crate::strategies::{
        BackoffType, CircuitBreakerManualControl, CircuitBreakerStateProvider,
        CircuitBreakerStrategyOptions, CircuitState, ConcurrencyLimiter, ConcurrencyLimiterOptions,
        FallbackStrategyOptions, HedgedAction, HedgingDelay, HedgingStrategyOptions,
        JitterStrategy, RetryStrategyOptions, TimeoutStrategyOptions,
    };
    pub use crate::telemetry::{
        LoggingTelemetrySink, NoOpTelemetrySink, Severity, TelemetryCounters, TelemetryEvent,
        TelemetrySink,
    };
}
