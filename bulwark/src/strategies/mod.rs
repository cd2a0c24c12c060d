//! Built-in resilience strategies.
//!
//! This module provides:
//! - Retry with constant, linear or exponential backoff and jitter
//! - A circuit breaker with manual control
//! - Timeouts driven by cooperative cancellation
//! - Fallback substitution
//! - Hedged requests
//! - A concurrency limiter with a bounded queue
//!
//! Each strategy pairs an options type, validated when a pipeline is built,
//! with the strategy value the builder places in the chain.

pub mod circuit_breaker;
mod concurrency_limiter;
mod fallback;
mod hedging;
mod retry;
mod timeout;

pub use circuit_breaker::{
    CircuitBreakerManualControl, CircuitBreakerStateProvider, CircuitBreakerStrategy,
    CircuitBreakerStrategyOptions, CircuitState,
};
pub use concurrency_limiter::{
    AcquireError, ConcurrencyLease, ConcurrencyLimiter, ConcurrencyLimiterOptions,
    ConcurrencyLimiterStrategy, OnRejected, OnRejectedArguments,
};
pub use fallback::{FallbackAction, FallbackStrategy, FallbackStrategyOptions, OnFallback, OnFallbackArguments};
pub use hedging::{
    HedgedAction, HedgingActionGenerator, HedgingArguments, HedgingDelay, HedgingDelayGenerator,
    HedgingStrategy, HedgingStrategyOptions, OnHedging, MAX_HEDGED_ATTEMPTS,
};
pub use retry::{
    BackoffType, DelayCalculator, JitterStrategy, OnRetry, OnRetryArguments, RetryDelayArguments,
    RetryDelayGenerator, RetryStrategy, RetryStrategyOptions, MAX_RETRY_DELAY,
};
pub use timeout::{
    OnTimeout, OnTimeoutArguments, TimeoutGenerator, TimeoutStrategy, TimeoutStrategyOptions,
    MAX_TIMEOUT, MIN_TIMEOUT,
};
