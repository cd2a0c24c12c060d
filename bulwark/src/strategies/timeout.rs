//! Timeout strategy.
//!
//! Runs the inner pipeline on a child cancellation token and cancels that
//! token when the deadline passes. The strategy only signals: the inner
//! future is dropped once the timeout is reported, and code that handed the
//! token to spawned work is expected to observe it.

use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::pipeline::{Next, ResilienceStrategy};
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Shortest accepted timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Longest accepted timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Arguments passed to [`TimeoutStrategyOptions::on_timeout`].
#[derive(Debug)]
pub struct OnTimeoutArguments<'a> {
    /// Context of the execution that timed out.
    pub context: &'a ResilienceContext,
    /// The timeout that elapsed.
    pub timeout: Duration,
}

/// Hook invoked when the deadline passes.
pub type OnTimeout = Arc<dyn Fn(&OnTimeoutArguments<'_>) + Send + Sync>;

/// Per-execution timeout source; `None` disables the deadline.
pub type TimeoutGenerator = Arc<dyn Fn(&ResilienceContext) -> Option<Duration> + Send + Sync>;

/// Options of the timeout strategy.
#[derive(Clone)]
pub struct TimeoutStrategyOptions {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// The deadline.
    pub timeout: Duration,
    /// Per-execution override.
    pub timeout_generator: Option<TimeoutGenerator>,
    /// Hook invoked on expiry.
    pub on_timeout: Option<OnTimeout>,
}

impl Default for TimeoutStrategyOptions {
    fn default() -> Self {
        Self {
            name: None,
            timeout: Duration::from_secs(30),
            timeout_generator: None,
            on_timeout: None,
        }
    }
}

impl fmt::Debug for TimeoutStrategyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutStrategyOptions")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("timeout_generator", &self.timeout_generator.is_some())
            .finish_non_exhaustive()
    }
}

impl From<Duration> for TimeoutStrategyOptions {
    fn from(timeout: Duration) -> Self {
        Self::new(timeout)
    }
}

impl TimeoutStrategyOptions {
    /// Creates options with the given deadline.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets a per-execution timeout source.
    ///
    /// `None` or a zero duration runs the execution without a deadline.
    /// Other values are clamped to `MIN_TIMEOUT..=MAX_TIMEOUT`.
    #[must_use]
    pub fn with_timeout_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&ResilienceContext) -> Option<Duration> + Send + Sync + 'static,
    {
        self.timeout_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the expiry hook.
    #[must_use]
    pub fn with_on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: Fn(&OnTimeoutArguments<'_>) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(on_timeout));
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        if self.timeout < MIN_TIMEOUT || self.timeout > MAX_TIMEOUT {
            return Err(vec![format!(
                "timeout must be between {MIN_TIMEOUT:?} and {MAX_TIMEOUT:?}, got {:?}",
                self.timeout
            )]);
        }
        Ok(())
    }
}

enum Interrupted {
    Expired,
    Cancelled,
}

/// The timeout strategy.
#[derive(Debug)]
pub struct TimeoutStrategy {
    options: TimeoutStrategyOptions,
    telemetry: StrategyTelemetry,
}

impl TimeoutStrategy {
    pub(crate) fn new(options: TimeoutStrategyOptions, telemetry: StrategyTelemetry) -> Self {
        Self { options, telemetry }
    }

    fn timeout_for(&self, ctx: &ResilienceContext) -> Option<Duration> {
        match &self.options.timeout_generator {
            Some(generator) => generator(ctx)
                .filter(|timeout| !timeout.is_zero())
                .map(|timeout| timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)),
            None => Some(self.options.timeout),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for TimeoutStrategy {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        let Some(timeout) = self.timeout_for(ctx) else {
            return next.run(ctx).await;
        };

        let parent = Arc::clone(ctx.cancellation());
        let child = parent.child();
        ctx.replace_cancellation(Arc::clone(&child));

        let result = {
            let inner = next.run(ctx);
            tokio::select! {
                biased;
                outcome = inner => Ok(outcome),
                () = parent.cancelled() => Err(Interrupted::Cancelled),
                () = tokio::time::sleep(timeout) => Err(Interrupted::Expired),
            }
        };
        ctx.replace_cancellation(Arc::clone(&parent));

        match result {
            Ok(outcome) => outcome,
            Err(Interrupted::Cancelled) => Outcome::cancelled(
                parent
                    .reason()
                    .unwrap_or_else(|| "timeout cancelled".to_string()),
            ),
            Err(Interrupted::Expired) => {
                child.cancel(format!("timed out after {timeout:?}"));
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Execution timed out"
                );

                if let Some(on_timeout) = &self.options.on_timeout {
                    on_timeout(&OnTimeoutArguments {
                        context: ctx,
                        timeout,
                    });
                }
                let event = self
                    .telemetry
                    .event(ctx, names::ON_TIMEOUT, Severity::Error)
                    .with_duration(timeout);
                self.telemetry.report(ctx, event);

                Outcome::error(ResilienceError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::ErrorKind;
    use crate::pipeline::ResiliencePipelineBuilder;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_options_validation() {
        assert!(TimeoutStrategyOptions::default().validate().is_ok());
        assert!(TimeoutStrategyOptions::new(Duration::from_millis(1)).validate().is_err());
        assert!(TimeoutStrategyOptions::new(MAX_TIMEOUT + Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_completing_call_times_out() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook = fired.clone();
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_timeout(
                TimeoutStrategyOptions::new(Duration::from_millis(200))
                    .with_on_timeout(move |args| {
                        assert_eq!(args.timeout, Duration::from_millis(200));
                        hook.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .build()
            .unwrap();

        let started = Instant::now();
        let outcome = pipeline
            .execute(|_| futures::future::pending::<Outcome<()>>())
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_millis(210));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_token_is_cancelled_on_expiry() {
        let observed = Arc::new(AtomicBool::new(false));
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let seen = observed.clone();
        let outcome = pipeline
            .execute(move |token| {
                let seen = seen.clone();
                token.on_cancel(move || seen.store(true, Ordering::SeqCst));
                futures::future::pending::<Outcome<()>>()
            })
            .await;

        assert!(outcome.is_error());
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let pipeline = ResiliencePipelineBuilder::<i32>::new()
            .add_timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Outcome::value(1)
            })
            .await;
        assert_eq!(outcome.as_value(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_is_not_masked() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let token = Arc::new(CancellationToken::new());
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel("user pressed stop");
        });

        let outcome = pipeline
            .execute_cancellable(token, |token| async move {
                token.cancelled().await;
                Outcome::cancelled(token.reason().unwrap_or_default())
            })
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_can_disable_deadline() {
        let pipeline = ResiliencePipelineBuilder::<&'static str>::new()
            .add_timeout(
                TimeoutStrategyOptions::new(Duration::from_millis(10)).with_timeout_generator(|ctx| {
                    if ctx.operation_key() == Some("slow-report") {
                        None
                    } else {
                        Some(Duration::from_millis(10))
                    }
                }),
            )
            .build()
            .unwrap();

        let mut ctx = ResilienceContext::new().with_operation_key("slow-report");
        let outcome = pipeline
            .execute_with_context(&mut ctx, |_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Outcome::value("done")
                })
            })
            .await;
        assert_eq!(outcome.as_value(), Some(&"done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generated_timeouts_are_clamped() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_timeout(
                TimeoutStrategyOptions::new(Duration::from_secs(1)).with_timeout_generator(|ctx| {
                    match ctx.operation_key() {
                        Some("tiny") => Some(Duration::from_nanos(1)),
                        _ => Some(Duration::MAX),
                    }
                }),
            )
            .build()
            .unwrap();

        let mut tiny = ResilienceContext::new().with_operation_key("tiny");
        let started = Instant::now();
        let outcome = pipeline
            .execute_with_context(&mut tiny, |_| Box::pin(futures::future::pending()))
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() >= MIN_TIMEOUT);
        assert!(started.elapsed() < MIN_TIMEOUT + Duration::from_millis(5));

        let mut huge = ResilienceContext::new().with_operation_key("huge");
        let started = Instant::now();
        let outcome = pipeline
            .execute_with_context(&mut huge, |_| Box::pin(futures::future::pending()))
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert!(started.elapsed() >= MAX_TIMEOUT);
        assert!(started.elapsed() < MAX_TIMEOUT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_token_restored_after_execution() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let mut ctx = ResilienceContext::new();
        let original = Arc::clone(ctx.cancellation());

        let _ = pipeline
            .execute_with_context(&mut ctx, |_| Box::pin(futures::future::pending()))
            .await;

        assert!(Arc::ptr_eq(ctx.cancellation(), &original));
        assert!(!ctx.is_cancelled());
    }
}
