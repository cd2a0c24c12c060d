//! Retry strategy with configurable backoff and jitter.
//!
//! Re-runs the inner pipeline while its outcome is handled by the
//! strategy's [`ShouldHandle`] predicate and attempts remain. Delays follow
//! a [`BackoffType`] and may be randomised with a [`JitterStrategy`] to
//! prevent thundering herds.

use crate::context::{ResilienceContext, RETRY_ATTEMPT};
use crate::pipeline::{Next, ResilienceStrategy};
use crate::predicate::ShouldHandle;
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Longest delay the retry strategy accepts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff family for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base * 2^attempt
    Exponential,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Arguments passed to [`RetryStrategyOptions::on_retry`].
#[derive(Debug)]
pub struct OnRetryArguments<'a, T> {
    /// Outcome of the attempt that is about to be retried.
    pub outcome: &'a Outcome<T>,
    /// Zero-based index of the attempt that failed.
    pub attempt_number: u32,
    /// Delay before the next attempt.
    pub retry_delay: Duration,
    /// How long the failed attempt took.
    pub duration: Duration,
}

/// Arguments passed to [`RetryStrategyOptions::delay_generator`].
#[derive(Debug)]
pub struct RetryDelayArguments<'a, T> {
    /// Outcome of the attempt that failed.
    pub outcome: &'a Outcome<T>,
    /// Zero-based index of the attempt that failed.
    pub attempt_number: u32,
}

/// Hook invoked before each retry.
pub type OnRetry<T> = Arc<dyn Fn(&OnRetryArguments<'_, T>) + Send + Sync>;

/// Custom delay source; `None` falls back to the configured backoff.
pub type RetryDelayGenerator<T> =
    Arc<dyn Fn(&RetryDelayArguments<'_, T>) -> Option<Duration> + Send + Sync>;

/// Options of the retry strategy.
pub struct RetryStrategyOptions<T> {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// Retries after the first attempt; `u32::MAX` retries forever.
    pub max_retry_attempts: u32,
    /// Base delay.
    pub delay: Duration,
    /// Backoff family.
    pub backoff_type: BackoffType,
    /// Jitter.
    pub jitter: JitterStrategy,
    /// Upper bound on any single delay.
    pub max_delay: Option<Duration>,
    /// Custom delay source.
    pub delay_generator: Option<RetryDelayGenerator<T>>,
    /// Which outcomes are retried.
    pub should_handle: ShouldHandle<T>,
    /// Hook invoked before each retry.
    pub on_retry: Option<OnRetry<T>>,
}

impl<T: 'static> Default for RetryStrategyOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            max_retry_attempts: 3,
            delay: Duration::from_secs(2),
            backoff_type: BackoffType::Constant,
            jitter: JitterStrategy::None,
            max_delay: None,
            delay_generator: None,
            should_handle: ShouldHandle::default(),
            on_retry: None,
        }
    }
}

impl<T> Clone for RetryStrategyOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_retry_attempts: self.max_retry_attempts,
            delay: self.delay,
            backoff_type: self.backoff_type,
            jitter: self.jitter,
            max_delay: self.max_delay,
            delay_generator: self.delay_generator.clone(),
            should_handle: self.should_handle.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<T> fmt::Debug for RetryStrategyOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryStrategyOptions")
            .field("name", &self.name)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("delay", &self.delay)
            .field("backoff_type", &self.backoff_type)
            .field("jitter", &self.jitter)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> RetryStrategyOptions<T> {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that retry until success or cancellation.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default().with_max_retry_attempts(u32::MAX)
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the backoff family.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffType) -> Self {
        self.backoff_type = backoff;
        self
    }

    /// Sets the jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Caps every delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sets a custom delay source.
    #[must_use]
    pub fn with_delay_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RetryDelayArguments<'_, T>) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_should_handle(mut self, should_handle: impl Into<ShouldHandle<T>>) -> Self {
        self.should_handle = should_handle.into();
        self
    }

    /// Sets the retry hook.
    #[must_use]
    pub fn with_on_retry<F>(mut self, on_retry: F) -> Self
    where
        F: Fn(&OnRetryArguments<'_, T>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(on_retry));
        self
    }

    /// Returns true if the strategy never gives up.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.max_retry_attempts == u32::MAX
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.max_retry_attempts < 1 {
            errors.push("max_retry_attempts must be at least 1".to_string());
        }
        if self.delay > MAX_RETRY_DELAY {
            errors.push(format!(
                "delay must not exceed {MAX_RETRY_DELAY:?}, got {:?}",
                self.delay
            ));
        }
        if let Some(max_delay) = self.max_delay {
            if max_delay < self.delay {
                errors.push(format!(
                    "max_delay ({max_delay:?}) must not be shorter than delay ({:?})",
                    self.delay
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Computes backoff delays for one execution.
///
/// Decorrelated jitter depends on the previous delay, so every execution
/// owns its own calculator.
#[derive(Debug)]
pub struct DelayCalculator {
    backoff: BackoffType,
    jitter: JitterStrategy,
    base: Duration,
    max_delay: Option<Duration>,
    previous: Option<Duration>,
}

impl DelayCalculator {
    /// Creates a calculator.
    #[must_use]
    pub fn new(
        backoff: BackoffType,
        jitter: JitterStrategy,
        base: Duration,
        max_delay: Option<Duration>,
    ) -> Self {
        Self {
            backoff,
            jitter,
            base,
            max_delay,
            previous: None,
        }
    }

    /// Calculates the delay before retry `attempt` (zero-based).
    pub fn delay(&mut self, attempt: u32) -> Duration {
        let base = duration_to_millis(self.base);
        let max = self.max_delay.map_or(u64::MAX, duration_to_millis);

        let delay = match self.backoff {
            BackoffType::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)),
            BackoffType::Linear => base.saturating_mul(u64::from(attempt) + 1),
            BackoffType::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous.map_or(base, duration_to_millis);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base.min(max)
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        let delay = Duration::from_millis(jittered);
        self.previous = Some(delay);
        delay
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The retry strategy.
#[derive(Debug)]
pub struct RetryStrategy<T> {
    options: RetryStrategyOptions<T>,
    telemetry: StrategyTelemetry,
}

impl<T: Send + 'static> RetryStrategy<T> {
    pub(crate) fn new(options: RetryStrategyOptions<T>, telemetry: StrategyTelemetry) -> Self {
        Self { options, telemetry }
    }

    fn has_attempts_left(&self, retries_done: u32) -> bool {
        self.options.is_unbounded() || retries_done < self.options.max_retry_attempts
    }

    fn retry_delay(&self, calculator: &mut DelayCalculator, outcome: &Outcome<T>, attempt: u32) -> Duration {
        let generated = self.options.delay_generator.as_ref().and_then(|generator| {
            generator(&RetryDelayArguments {
                outcome,
                attempt_number: attempt,
            })
        });
        let delay = generated.unwrap_or_else(|| calculator.delay(attempt));
        match self.options.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for RetryStrategy<T> {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        let mut calculator = DelayCalculator::new(
            self.options.backoff_type,
            self.options.jitter,
            self.options.delay,
            self.options.max_delay,
        );
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return Outcome::cancelled(
                    ctx.cancellation()
                        .reason()
                        .unwrap_or_else(|| "retry cancelled".to_string()),
                );
            }

            ctx.properties_mut().set(&RETRY_ATTEMPT, attempt);
            let started = Instant::now();
            let outcome = next.run(ctx).await;
            let duration = started.elapsed();

            let handled = self.options.should_handle.handles(&outcome);
            let retrying = handled && self.has_attempts_left(attempt);

            let severity = if !handled {
                Severity::Information
            } else if retrying {
                Severity::Warning
            } else {
                Severity::Error
            };
            let event = self
                .telemetry
                .event(ctx, names::EXECUTION_ATTEMPT, severity)
                .with_attempt(attempt)
                .with_handled(handled)
                .with_outcome(&outcome)
                .with_duration(duration);
            self.telemetry.report(ctx, event);

            if !retrying {
                return outcome;
            }

            let delay = self.retry_delay(&mut calculator, &outcome, attempt);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                outcome = %outcome.describe(),
                "Retrying after handled outcome"
            );

            if let Some(on_retry) = &self.options.on_retry {
                on_retry(&OnRetryArguments {
                    outcome: &outcome,
                    attempt_number: attempt,
                    retry_delay: delay,
                    duration,
                });
            }
            let event = self
                .telemetry
                .event(ctx, names::ON_RETRY, Severity::Warning)
                .with_attempt(attempt)
                .with_outcome(&outcome)
                .with_duration(delay);
            self.telemetry.report(ctx, event);

            if !delay.is_zero() {
                let token = Arc::clone(ctx.cancellation());
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => {
                        return Outcome::cancelled(
                            token.reason().unwrap_or_else(|| "retry cancelled".to_string()),
                        );
                    }
                }
            }

            attempt = attempt.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::context::MAX_RETAINED_EVENTS;
    use futures::FutureExt;
    use crate::errors::{ErrorKind, ResilienceError};
    use crate::pipeline::ResiliencePipelineBuilder;
    use crate::predicate::PredicateBuilder;
    use crate::telemetry::{CollectingTelemetrySink, TelemetrySink};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_delay() -> RetryStrategyOptions<u32> {
        RetryStrategyOptions::new().with_delay(Duration::ZERO)
    }

    #[test]
    fn test_options_defaults() {
        let options = RetryStrategyOptions::<u32>::default();
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.delay, Duration::from_secs(2));
        assert_eq!(options.backoff_type, BackoffType::Constant);
        assert_eq!(options.jitter, JitterStrategy::None);
        assert!(!options.is_unbounded());
        assert!(RetryStrategyOptions::<u32>::unbounded().is_unbounded());
    }

    #[test]
    fn test_options_validation() {
        let options = RetryStrategyOptions::<u32>::new()
            .with_max_retry_attempts(0)
            .with_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1));
        let errors = options.validate().unwrap_err();
        assert_eq!(errors.len(), 2);

        let too_long = RetryStrategyOptions::<u32>::new().with_delay(MAX_RETRY_DELAY * 2);
        assert!(too_long.validate().is_err());
        assert!(RetryStrategyOptions::<u32>::new().validate().is_ok());
    }

    #[test]
    fn test_delay_exponential_no_jitter() {
        let mut calc = DelayCalculator::new(
            BackoffType::Exponential,
            JitterStrategy::None,
            Duration::from_millis(100),
            None,
        );
        assert_eq!(calc.delay(0), Duration::from_millis(100));
        assert_eq!(calc.delay(1), Duration::from_millis(200));
        assert_eq!(calc.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_linear_no_jitter() {
        let mut calc = DelayCalculator::new(
            BackoffType::Linear,
            JitterStrategy::None,
            Duration::from_millis(100),
            None,
        );
        assert_eq!(calc.delay(0), Duration::from_millis(100));
        assert_eq!(calc.delay(1), Duration::from_millis(200));
        assert_eq!(calc.delay(2), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_constant_and_cap() {
        let mut constant = DelayCalculator::new(
            BackoffType::Constant,
            JitterStrategy::None,
            Duration::from_millis(100),
            None,
        );
        assert_eq!(constant.delay(7), Duration::from_millis(100));

        let mut capped = DelayCalculator::new(
            BackoffType::Exponential,
            JitterStrategy::None,
            Duration::from_secs(1),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(capped.delay(10), Duration::from_secs(5));
        assert_eq!(capped.delay(64), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_jitter_bounds() {
        let base = Duration::from_millis(100);
        let mut full = DelayCalculator::new(BackoffType::Constant, JitterStrategy::Full, base, None);
        let mut equal = DelayCalculator::new(BackoffType::Constant, JitterStrategy::Equal, base, None);
        let mut decorrelated = DelayCalculator::new(
            BackoffType::Constant,
            JitterStrategy::Decorrelated,
            base,
            Some(Duration::from_millis(1000)),
        );

        for attempt in 0..50 {
            assert!(full.delay(attempt) <= base);
            let d = equal.delay(attempt);
            assert!(d >= Duration::from_millis(50) && d <= base);
            let d = decorrelated.delay(attempt);
            assert!(d >= base && d <= Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));
        let retries_hook = retries.clone();
        let pipeline = ResiliencePipelineBuilder::new()
            .add_retry(
                no_delay()
                    .with_max_retry_attempts(5)
                    .with_on_retry(move |_| {
                        retries_hook.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Outcome::failure(anyhow::anyhow!("transient {n}"))
                    } else {
                        Outcome::value(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(retries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_outcome() {
        let calls = Arc::new(AtomicU32::new(0));
        let attempts_seen = Arc::new(Mutex::new(Vec::new()));
        let seen = attempts_seen.clone();
        let pipeline = ResiliencePipelineBuilder::new()
            .add_retry(
                no_delay()
                    .with_max_retry_attempts(2)
                    .with_on_retry(move |args| seen.lock().push(args.attempt_number)),
            )
            .build()
            .unwrap();

        let outcome: Outcome<u32> = pipeline
            .execute(|_| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Outcome::failure(anyhow::anyhow!("failure {n}"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*attempts_seen.lock(), vec![0, 1]);
        let message = outcome.as_error().map(ToString::to_string);
        assert_eq!(message.as_deref(), Some("failure 2"));
    }

    #[tokio::test]
    async fn test_unhandled_outcome_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = ResiliencePipelineBuilder::new()
            .add_retry(no_delay().with_should_handle(
                PredicateBuilder::new().handle_kind(ErrorKind::Timeout),
            ))
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::<u32>::failure(anyhow::anyhow!("permanent")) }
            })
            .await;

        assert!(outcome.is_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_on_handled_result() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = ResiliencePipelineBuilder::new()
            .add_retry(no_delay().with_should_handle(PredicateBuilder::new().handle_result(|v| *v < 2)))
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Outcome::value(n) }
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&2));
    }

    #[tokio::test]
    async fn test_attempt_property_is_set() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_retry(no_delay().with_should_handle(PredicateBuilder::new().handle_result(|v| *v < 2)))
            .build()
            .unwrap();
        let mut ctx = ResilienceContext::new();

        let outcome = pipeline
            .execute_with_context(&mut ctx, |ctx| {
                let attempt = ctx.properties().get_or(&RETRY_ATTEMPT, 99);
                Box::pin(async move { Outcome::value(attempt) })
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&2));
        assert_eq!(ctx.properties().get(&RETRY_ATTEMPT), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_backoff_delay() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_retry(
                RetryStrategyOptions::new()
                    .with_max_retry_attempts(2)
                    .with_delay(Duration::from_millis(100))
                    .with_backoff(BackoffType::Exponential),
            )
            .build()
            .unwrap();

        let started = Instant::now();
        let outcome: Outcome<()> = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("down")) })
            .await;

        assert!(outcome.is_error());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_generator_overrides_backoff() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_retry(
                RetryStrategyOptions::new()
                    .with_max_retry_attempts(1)
                    .with_delay(Duration::from_secs(10))
                    .with_delay_generator(|_| Some(Duration::from_millis(5))),
            )
            .build()
            .unwrap();

        let started = Instant::now();
        let _: Outcome<()> = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("down")) })
            .await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_delay() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_retry(RetryStrategyOptions::unbounded().with_delay(Duration::from_secs(1)))
            .build()
            .unwrap();
        let token = Arc::new(CancellationToken::new());
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel("shutdown");
        });

        let calls = AtomicU32::new(0);
        let outcome: Outcome<()> = pipeline
            .execute_cancellable(token, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::failure(anyhow::anyhow!("down")) }
            })
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let pipeline = ResiliencePipelineBuilder::<u32>::new()
            .add_retry(no_delay())
            .build()
            .unwrap();
        let token = Arc::new(CancellationToken::new());
        token.cancel("not needed");

        let calls = AtomicU32::new(0);
        let outcome = pipeline
            .execute_cancellable(token, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::value(1) }
            })
            .await;

        assert!(matches!(outcome, Outcome::Error(ResilienceError::Cancelled(ref r)) if r == "not needed"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reports_attempt_and_retry_events() {
        let sink = Arc::new(CollectingTelemetrySink::new());
        let pipeline = ResiliencePipelineBuilder::new()
            .with_telemetry(sink.clone() as Arc<dyn TelemetrySink>)
            .add_retry(no_delay().with_max_retry_attempts(2).with_name("retry-orders"))
            .build()
            .unwrap();

        let _: Outcome<u32> = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("down")) })
            .await;

        assert_eq!(sink.count(names::EXECUTION_ATTEMPT), 3);
        assert_eq!(sink.count(names::ON_RETRY), 2);
        let retry_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.event_name == names::ON_RETRY)
            .collect();
        assert_eq!(retry_events[0].strategy_name.as_deref(), Some("retry-orders"));
    }

    #[tokio::test]
    async fn test_unbounded_retry_keeps_context_events_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = ResiliencePipelineBuilder::new()
            .with_telemetry(Arc::new(crate::telemetry::NoOpTelemetrySink) as Arc<dyn TelemetrySink>)
            .add_retry(RetryStrategyOptions::unbounded().with_delay(Duration::ZERO))
            .build()
            .unwrap();
        let mut ctx = ResilienceContext::new();

        let outcome = pipeline
            .execute_with_context(&mut ctx, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2_000 {
                        Outcome::failure(anyhow::anyhow!("still down"))
                    } else {
                        Outcome::value(n)
                    }
                }
                .boxed()
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&2_000));
        assert_eq!(ctx.events().len(), MAX_RETAINED_EVENTS);
        assert!(ctx.dropped_events() > 3_000);
        assert_eq!(ctx.events().back().map(|e| e.name), Some(names::PIPELINE_EXECUTED));
    }
}
