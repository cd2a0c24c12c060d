//! Hedging strategy.
//!
//! Issues redundant attempts of the inner pipeline and returns the first
//! outcome the [`ShouldHandle`] predicate does not handle. The
//! [`HedgingDelay`] selects the mode:
//!
//! - [`HedgingDelay::After`]: latency mode, a hedged attempt starts when no
//!   acceptable outcome arrived within the delay.
//! - [`HedgingDelay::Parallel`]: every attempt starts at once.
//! - [`HedgingDelay::OnFailure`]: fallback-chained mode, the next attempt
//!   starts only after the previous one produced a handled outcome.
//!
//! In every mode a handled outcome starts the next attempt immediately.
//! Each attempt runs on its own child context; when a winner is chosen the
//! other attempts are cancelled and dropped, and the winner's properties
//! are merged back into the caller's context.

use crate::cancellation::CancellationToken;
use crate::context::{ResilienceContext, HEDGING_ATTEMPT};
use crate::pipeline::{Next, ResilienceStrategy};
use crate::predicate::ShouldHandle;
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Most hedged attempts a strategy may issue.
pub const MAX_HEDGED_ATTEMPTS: u32 = 10;

/// When the next hedged attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgingDelay {
    /// After the delay elapsed without an acceptable outcome.
    After(Duration),
    /// Immediately.
    Parallel,
    /// Only after the previous attempt produced a handled outcome.
    OnFailure,
}

impl From<Duration> for HedgingDelay {
    fn from(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::Parallel
        } else {
            Self::After(delay)
        }
    }
}

impl Default for HedgingDelay {
    fn default() -> Self {
        Self::After(Duration::from_secs(2))
    }
}

/// What a hedged attempt runs.
pub enum HedgedAction<T> {
    /// Run the inner pipeline again.
    Replay,
    /// Produce this outcome without a live call.
    Substitute(Outcome<T>),
    /// Run a custom future.
    Custom(BoxFuture<'static, Outcome<T>>),
}

impl<T> fmt::Debug for HedgedAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replay => f.write_str("Replay"),
            Self::Substitute(outcome) => write!(f, "Substitute({})", outcome.describe()),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Arguments of the hedging generators and hooks.
#[derive(Debug)]
pub struct HedgingArguments<'a> {
    /// Index of the attempt: 0 is the primary call, 1.. are hedged.
    pub attempt_number: u32,
    /// The caller's context.
    pub context: &'a ResilienceContext,
}

/// Chooses what hedged attempt `attempt_number` runs; `None` stops hedging.
pub type HedgingActionGenerator<T> =
    Arc<dyn Fn(&HedgingArguments<'_>) -> Option<HedgedAction<T>> + Send + Sync>;

/// Chooses the delay before hedged attempt `attempt_number`.
pub type HedgingDelayGenerator = Arc<dyn Fn(&HedgingArguments<'_>) -> HedgingDelay + Send + Sync>;

/// Hook invoked before a hedged attempt starts.
pub type OnHedging = Arc<dyn Fn(&HedgingArguments<'_>) + Send + Sync>;

/// Options of the hedging strategy.
pub struct HedgingStrategyOptions<T> {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// Attempts issued in addition to the primary call.
    pub max_hedged_attempts: u32,
    /// Delay before each hedged attempt.
    pub delay: HedgingDelay,
    /// Per-attempt delay override.
    pub delay_generator: Option<HedgingDelayGenerator>,
    /// Per-attempt action; the default replays the inner pipeline.
    pub action_generator: Option<HedgingActionGenerator<T>>,
    /// Outcomes that do not win the race.
    pub should_handle: ShouldHandle<T>,
    /// Hook invoked before each hedged attempt.
    pub on_hedging: Option<OnHedging>,
}

impl<T: 'static> Default for HedgingStrategyOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            max_hedged_attempts: 1,
            delay: HedgingDelay::default(),
            delay_generator: None,
            action_generator: None,
            should_handle: ShouldHandle::default(),
            on_hedging: None,
        }
    }
}

impl<T> Clone for HedgingStrategyOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_hedged_attempts: self.max_hedged_attempts,
            delay: self.delay,
            delay_generator: self.delay_generator.clone(),
            action_generator: self.action_generator.clone(),
            should_handle: self.should_handle.clone(),
            on_hedging: self.on_hedging.clone(),
        }
    }
}

impl<T> fmt::Debug for HedgingStrategyOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingStrategyOptions")
            .field("name", &self.name)
            .field("max_hedged_attempts", &self.max_hedged_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> HedgingStrategyOptions<T> {
    /// Creates options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the number of hedged attempts.
    #[must_use]
    pub fn with_max_hedged_attempts(mut self, attempts: u32) -> Self {
        self.max_hedged_attempts = attempts;
        self
    }

    /// Sets the delay.
    #[must_use]
    pub fn with_delay(mut self, delay: impl Into<HedgingDelay>) -> Self {
        self.delay = delay.into();
        self
    }

    /// Sets a per-attempt delay source.
    #[must_use]
    pub fn with_delay_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&HedgingArguments<'_>) -> HedgingDelay + Send + Sync + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Sets a per-attempt action source.
    #[must_use]
    pub fn with_action_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&HedgingArguments<'_>) -> Option<HedgedAction<T>> + Send + Sync + 'static,
    {
        self.action_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_should_handle(mut self, should_handle: impl Into<ShouldHandle<T>>) -> Self {
        self.should_handle = should_handle.into();
        self
    }

    /// Sets the hedging hook.
    #[must_use]
    pub fn with_on_hedging<F>(mut self, on_hedging: F) -> Self
    where
        F: Fn(&HedgingArguments<'_>) + Send + Sync + 'static,
    {
        self.on_hedging = Some(Arc::new(on_hedging));
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        if !(1..=MAX_HEDGED_ATTEMPTS).contains(&self.max_hedged_attempts) {
            return Err(vec![format!(
                "max_hedged_attempts must be between 1 and {MAX_HEDGED_ATTEMPTS}, got {}",
                self.max_hedged_attempts
            )]);
        }
        Ok(())
    }
}

type AttemptFuture<'a, T> = BoxFuture<'a, (u32, Outcome<T>, ResilienceContext)>;

/// The hedging strategy.
pub struct HedgingStrategy<T> {
    options: HedgingStrategyOptions<T>,
    telemetry: StrategyTelemetry,
}

impl<T> fmt::Debug for HedgingStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingStrategy")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> HedgingStrategy<T> {
    pub(crate) fn new(options: HedgingStrategyOptions<T>, telemetry: StrategyTelemetry) -> Self {
        Self { options, telemetry }
    }

    fn delay_before(&self, ctx: &ResilienceContext, attempt_number: u32) -> HedgingDelay {
        match &self.options.delay_generator {
            Some(generator) => generator(&HedgingArguments {
                attempt_number,
                context: ctx,
            }),
            None => self.options.delay,
        }
    }

    /// Starts attempt `attempt_number`; `None` when the action generator
    /// declines.
    fn launch<'n>(
        &self,
        ctx: &mut ResilienceContext,
        next: Next<'n, T>,
        attempt_number: u32,
    ) -> Option<(Arc<CancellationToken>, AttemptFuture<'n, T>)> {
        let action = if attempt_number == 0 {
            HedgedAction::Replay
        } else {
            let args = HedgingArguments {
                attempt_number,
                context: ctx,
            };
            let action = match &self.options.action_generator {
                Some(generator) => generator(&args)?,
                None => HedgedAction::Replay,
            };
            if let Some(on_hedging) = &self.options.on_hedging {
                on_hedging(&args);
            }
            let event = self
                .telemetry
                .event(ctx, names::ON_HEDGING, Severity::Warning)
                .with_attempt(attempt_number);
            self.telemetry.report(ctx, event);
            debug!(attempt = attempt_number, action = ?action, "Launching hedged attempt");
            action
        };

        let mut attempt_ctx = ctx.fork();
        attempt_ctx
            .properties_mut()
            .set(&HEDGING_ATTEMPT, attempt_number);
        let token = Arc::clone(attempt_ctx.cancellation());

        let future: AttemptFuture<'n, T> = match action {
            HedgedAction::Replay => Box::pin(async move {
                let mut attempt_ctx = attempt_ctx;
                let outcome = next.run(&mut attempt_ctx).await;
                (attempt_number, outcome, attempt_ctx)
            }),
            HedgedAction::Substitute(outcome) => {
                Box::pin(async move { (attempt_number, outcome, attempt_ctx) })
            }
            HedgedAction::Custom(future) => {
                Box::pin(async move { (attempt_number, future.await, attempt_ctx) })
            }
        };
        Some((token, future))
    }
}

fn cancel_all(tokens: &[Arc<CancellationToken>], except: Option<usize>, reason: &str) {
    for (index, token) in tokens.iter().enumerate() {
        if Some(index) != except {
            token.cancel(reason);
        }
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for HedgingStrategy<T> {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        if ctx.is_cancelled() {
            return Outcome::cancelled(
                ctx.cancellation()
                    .reason()
                    .unwrap_or_else(|| "hedging cancelled".to_string()),
            );
        }

        let caller = Arc::clone(ctx.cancellation());
        let started = Instant::now();
        let mut in_flight: FuturesUnordered<AttemptFuture<'_, T>> = FuturesUnordered::new();
        let mut tokens: Vec<Arc<CancellationToken>> = Vec::new();
        let mut last: Option<(Outcome<T>, ResilienceContext)> = None;
        let mut exhausted = false;

        if let Some((token, future)) = self.launch(ctx, next, 0) {
            tokens.push(token);
            in_flight.push(future);
        }

        loop {
            let next_attempt = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
            let can_launch = !exhausted && next_attempt <= self.options.max_hedged_attempts;

            if in_flight.is_empty() && !can_launch {
                break;
            }

            let delay = if !can_launch {
                None
            } else if in_flight.is_empty() {
                Some(Duration::ZERO)
            } else {
                match self.delay_before(ctx, next_attempt) {
                    HedgingDelay::After(delay) => Some(delay),
                    HedgingDelay::Parallel => Some(Duration::ZERO),
                    HedgingDelay::OnFailure => None,
                }
            };

            if delay == Some(Duration::ZERO) {
                match self.launch(ctx, next, next_attempt) {
                    Some((token, future)) => {
                        tokens.push(token);
                        in_flight.push(future);
                    }
                    None => exhausted = true,
                }
                continue;
            }

            tokio::select! {
                biased;
                () = caller.cancelled() => {
                    cancel_all(&tokens, None, "hedging cancelled");
                    return Outcome::cancelled(
                        caller.reason().unwrap_or_else(|| "hedging cancelled".to_string()),
                    );
                }
                Some((attempt, outcome, attempt_ctx)) = in_flight.next() => {
                    let handled = self.options.should_handle.handles(&outcome);
                    let event = self
                        .telemetry
                        .event(ctx, names::EXECUTION_ATTEMPT, if handled { Severity::Warning } else { Severity::Information })
                        .with_attempt(attempt)
                        .with_handled(handled)
                        .with_outcome(&outcome)
                        .with_duration(started.elapsed());
                    self.telemetry.report(ctx, event);

                    if !handled {
                        cancel_all(&tokens, usize::try_from(attempt).ok(), "another hedged attempt won");
                        drop(in_flight);
                        ctx.absorb(attempt_ctx);
                        return outcome;
                    }

                    last = Some((outcome, attempt_ctx));
                    if can_launch {
                        match self.launch(ctx, next, next_attempt) {
                            Some((token, future)) => {
                                tokens.push(token);
                                in_flight.push(future);
                            }
                            None => exhausted = true,
                        }
                    }
                }
                () = tokio::time::sleep(delay.unwrap_or_default()), if delay.is_some() => {
                    match self.launch(ctx, next, next_attempt) {
                        Some((token, future)) => {
                            tokens.push(token);
                            in_flight.push(future);
                        }
                        None => exhausted = true,
                    }
                }
            }
        }

        match last {
            Some((outcome, attempt_ctx)) => {
                ctx.absorb(attempt_ctx);
                outcome
            }
            None => Outcome::cancelled("hedging produced no attempt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::pipeline::ResiliencePipelineBuilder;
    use crate::telemetry::{CollectingTelemetrySink, TelemetrySink};
    use futures::FutureExt;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Launches = Arc<Mutex<Vec<(u32, Duration, Arc<CancellationToken>)>>>;

    /// Callable whose latency and result depend on the hedging attempt.
    fn scripted(
        launches: Launches,
        started: Instant,
        script: fn(u32) -> (u64, Result<&'static str, &'static str>),
    ) -> impl for<'c> Fn(&'c ResilienceContext) -> BoxFuture<'c, Outcome<&'static str>> + Send + Sync {
        move |ctx| {
            let attempt = ctx.properties().get_or(&HEDGING_ATTEMPT, 0);
            launches
                .lock()
                .push((attempt, started.elapsed(), Arc::clone(ctx.cancellation())));
            let (latency_ms, result) = script(attempt);
            async move {
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
                match result {
                    Ok(value) => Outcome::value(value),
                    Err(message) => Outcome::failure(anyhow::anyhow!(message)),
                }
            }
            .boxed()
        }
    }

    #[test]
    fn test_delay_from_duration() {
        assert_eq!(HedgingDelay::from(Duration::ZERO), HedgingDelay::Parallel);
        assert_eq!(
            HedgingDelay::from(Duration::from_millis(5)),
            HedgingDelay::After(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_options_validation() {
        assert!(HedgingStrategyOptions::<u32>::default().validate().is_ok());
        assert!(HedgingStrategyOptions::<u32>::new()
            .with_max_hedged_attempts(0)
            .validate()
            .is_err());
        assert!(HedgingStrategyOptions::<u32>::new()
            .with_max_hedged_attempts(11)
            .validate()
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_mode_hedges_once_and_cancels_loser() {
        let hedges = Arc::new(Mutex::new(Vec::new()));
        let seen = hedges.clone();
        let sink = Arc::new(CollectingTelemetrySink::new());
        let pipeline = ResiliencePipelineBuilder::new()
            .with_telemetry(sink.clone() as Arc<dyn TelemetrySink>)
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_delay(Duration::from_millis(20))
                    .with_on_hedging(move |args| seen.lock().push(args.attempt_number)),
            )
            .build()
            .unwrap();

        let launches: Launches = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();
        let mut ctx = ResilienceContext::new();
        let outcome = pipeline
            .execute_with_context(
                &mut ctx,
                scripted(launches.clone(), started, |attempt| match attempt {
                    0 => (100, Ok("primary")),
                    _ => (10, Ok("hedged")),
                }),
            )
            .await;

        assert_eq!(outcome.as_value(), Some(&"hedged"));
        assert_eq!(*hedges.lock(), vec![1]);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(started.elapsed() < Duration::from_millis(40));

        let launches = launches.lock();
        assert_eq!(launches.len(), 2);
        assert!(launches[1].1 >= Duration::from_millis(20));
        assert!(launches[1].1 < Duration::from_millis(25));
        assert!(launches[0].2.is_cancelled());
        assert!(!launches[1].2.is_cancelled());
        assert_eq!(ctx.properties().get(&HEDGING_ATTEMPT), Some(&1));
        assert_eq!(sink.count(names::EXECUTION_ATTEMPT), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_primary_needs_no_hedge() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(HedgingStrategyOptions::new().with_delay(Duration::from_millis(50)))
            .build()
            .unwrap();

        let launches: Launches = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResilienceContext::new();
        let outcome = pipeline
            .execute_with_context(
                &mut ctx,
                scripted(launches.clone(), Instant::now(), |_| (10, Ok("primary"))),
            )
            .await;

        assert_eq!(outcome.as_value(), Some(&"primary"));
        assert_eq!(launches.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_mode_launches_everything_at_once() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_max_hedged_attempts(2)
                    .with_delay(HedgingDelay::Parallel),
            )
            .build()
            .unwrap();

        let launches: Launches = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResilienceContext::new();
        let outcome = pipeline
            .execute_with_context(
                &mut ctx,
                scripted(launches.clone(), Instant::now(), |attempt| match attempt {
                    2 => (5, Ok("third")),
                    _ => (50, Ok("slow")),
                }),
            )
            .await;

        assert_eq!(outcome.as_value(), Some(&"third"));
        let launches = launches.lock();
        assert_eq!(launches.len(), 3);
        assert!(launches.iter().all(|(_, at, _)| *at == Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_failure_mode_chains_attempts() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_max_hedged_attempts(2)
                    .with_delay(HedgingDelay::OnFailure),
            )
            .build()
            .unwrap();

        let launches: Launches = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResilienceContext::new();
        let outcome = pipeline
            .execute_with_context(
                &mut ctx,
                scripted(launches.clone(), Instant::now(), |attempt| match attempt {
                    0 | 1 => (10, Err("unavailable")),
                    _ => (10, Ok("recovered")),
                }),
            )
            .await;

        assert_eq!(outcome.as_value(), Some(&"recovered"));
        let at: Vec<_> = launches.lock().iter().map(|(_, at, _)| *at).collect();
        assert_eq!(at.len(), 3);
        assert_eq!(at[0], Duration::ZERO);
        assert!(at[1] >= Duration::from_millis(10));
        assert!(at[2] >= at[1] + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_attempts_fail_returns_last_outcome() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_max_hedged_attempts(1)
                    .with_delay(HedgingDelay::OnFailure),
            )
            .build()
            .unwrap();

        let launches: Launches = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ResilienceContext::new();
        let outcome = pipeline
            .execute_with_context(
                &mut ctx,
                scripted(launches.clone(), Instant::now(), |attempt| match attempt {
                    0 => (10, Err("first")),
                    _ => (10, Err("second")),
                }),
            )
            .await;

        assert_eq!(outcome.as_error().map(ToString::to_string).as_deref(), Some("second"));
        assert_eq!(launches.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_generator_substitutes_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_max_hedged_attempts(2)
                    .with_delay(HedgingDelay::OnFailure)
                    .with_action_generator(|args| match args.attempt_number {
                        2 => Some(HedgedAction::Substitute(Outcome::value("static"))),
                        _ => Some(HedgedAction::Replay),
                    }),
            )
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Outcome::failure(anyhow::anyhow!("down")) }
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&"static"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_generator_can_stop_hedging() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook = fired.clone();
        let pipeline = ResiliencePipelineBuilder::<u32>::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_max_hedged_attempts(3)
                    .with_delay(HedgingDelay::OnFailure)
                    .with_action_generator(|_| None)
                    .with_on_hedging(move |_| {
                        hook.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("primary failed")) })
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Failure));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_action_runs_future() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_hedging(
                HedgingStrategyOptions::new()
                    .with_delay(Duration::from_millis(10))
                    .with_action_generator(|_| {
                        Some(HedgedAction::Custom(Box::pin(async { Outcome::value("mirror") })))
                    }),
            )
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Outcome::value("origin")
            })
            .await;
        assert_eq!(outcome.as_value(), Some(&"mirror"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_stops_race() {
        let pipeline = ResiliencePipelineBuilder::<()>::new()
            .add_hedging(HedgingStrategyOptions::new().with_delay(Duration::from_millis(10)))
            .build()
            .unwrap();
        let token = Arc::new(CancellationToken::new());
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            canceller.cancel("caller left");
        });

        let outcome = pipeline
            .execute_cancellable(token, |_| futures::future::pending::<Outcome<()>>())
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    }
}
