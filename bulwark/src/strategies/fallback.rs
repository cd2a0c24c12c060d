//! Fallback strategy.
//!
//! Substitutes handled outcomes with the result of a fallback action.
//! Stacking several fallback strategies builds a degradation chain: the
//! innermost one carries the most specific predicate, the outermost one is
//! the catch-all.

use crate::cancellation::CancellationToken;
use crate::context::ResilienceContext;
use crate::pipeline::{Next, ResilienceStrategy};
use crate::predicate::ShouldHandle;
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Arguments passed to [`FallbackStrategyOptions::on_fallback`].
#[derive(Debug)]
pub struct OnFallbackArguments<'a, T> {
    /// The handled outcome about to be replaced.
    pub outcome: &'a Outcome<T>,
    /// Context of the execution.
    pub context: &'a ResilienceContext,
}

/// Produces the substitute outcome.
///
/// Receives the handled outcome by value, so it can re-raise it unchanged.
pub type FallbackAction<T> =
    Arc<dyn Fn(Outcome<T>, Arc<CancellationToken>) -> BoxFuture<'static, Outcome<T>> + Send + Sync>;

/// Hook invoked before the fallback action runs.
pub type OnFallback<T> = Arc<dyn Fn(&OnFallbackArguments<'_, T>) + Send + Sync>;

/// Options of the fallback strategy.
pub struct FallbackStrategyOptions<T> {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// The action; building a pipeline without one fails.
    pub fallback_action: Option<FallbackAction<T>>,
    /// Which outcomes are replaced.
    pub should_handle: ShouldHandle<T>,
    /// Hook invoked before the action runs.
    pub on_fallback: Option<OnFallback<T>>,
}

impl<T: 'static> Default for FallbackStrategyOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            fallback_action: None,
            should_handle: ShouldHandle::default(),
            on_fallback: None,
        }
    }
}

impl<T> Clone for FallbackStrategyOptions<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fallback_action: self.fallback_action.clone(),
            should_handle: self.should_handle.clone(),
            on_fallback: self.on_fallback.clone(),
        }
    }
}

impl<T> fmt::Debug for FallbackStrategyOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackStrategyOptions")
            .field("name", &self.name)
            .field("fallback_action", &self.fallback_action.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> FallbackStrategyOptions<T> {
    /// Creates options without an action.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options running `action` on handled outcomes.
    pub fn with_action<F, Fut>(action: F) -> Self
    where
        F: Fn(Outcome<T>, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::default().with_fallback_action(action)
    }

    /// Creates options substituting a clone of `value`.
    pub fn with_value(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::with_action(move |_, _| {
            let value = value.clone();
            async move { Outcome::value(value) }
        })
    }

    /// Sets the action.
    #[must_use]
    pub fn with_fallback_action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(Outcome<T>, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.fallback_action = Some(Arc::new(move |outcome, token| {
            Box::pin(action(outcome, token)) as BoxFuture<'static, Outcome<T>>
        }));
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_should_handle(mut self, should_handle: impl Into<ShouldHandle<T>>) -> Self {
        self.should_handle = should_handle.into();
        self
    }

    /// Sets the fallback hook.
    #[must_use]
    pub fn with_on_fallback<F>(mut self, on_fallback: F) -> Self
    where
        F: Fn(&OnFallbackArguments<'_, T>) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(on_fallback));
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        if self.fallback_action.is_none() {
            return Err(vec!["fallback_action is required".to_string()]);
        }
        Ok(())
    }
}

/// The fallback strategy.
pub struct FallbackStrategy<T> {
    action: FallbackAction<T>,
    should_handle: ShouldHandle<T>,
    on_fallback: Option<OnFallback<T>>,
    telemetry: StrategyTelemetry,
}

impl<T> fmt::Debug for FallbackStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackStrategy")
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> FallbackStrategy<T> {
    /// Returns `None` when the options carry no action.
    pub(crate) fn new(options: FallbackStrategyOptions<T>, telemetry: StrategyTelemetry) -> Option<Self> {
        Some(Self {
            action: options.fallback_action?,
            should_handle: options.should_handle,
            on_fallback: options.on_fallback,
            telemetry,
        })
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for FallbackStrategy<T> {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        let outcome = next.run(ctx).await;
        if !self.should_handle.handles(&outcome) {
            return outcome;
        }

        debug!(outcome = %outcome.describe(), "Applying fallback");
        if let Some(on_fallback) = &self.on_fallback {
            on_fallback(&OnFallbackArguments {
                outcome: &outcome,
                context: ctx,
            });
        }
        let event = self
            .telemetry
            .event(ctx, names::ON_FALLBACK, Severity::Warning)
            .with_outcome(&outcome);
        self.telemetry.report(ctx, event);

        (self.action)(outcome, Arc::clone(ctx.cancellation())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, ResilienceError};
    use crate::pipeline::ResiliencePipelineBuilder;
    use crate::predicate::PredicateBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_action_is_required() {
        let options = FallbackStrategyOptions::<u32>::new();
        assert_eq!(
            options.validate().unwrap_err(),
            vec!["fallback_action is required".to_string()]
        );
        assert!(FallbackStrategyOptions::with_value(1u32).validate().is_ok());
    }

    #[tokio::test]
    async fn test_handled_failure_is_substituted() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook = fired.clone();
        let pipeline = ResiliencePipelineBuilder::new()
            .add_fallback(
                FallbackStrategyOptions::with_value("cached".to_string()).with_on_fallback(move |args| {
                    assert!(args.outcome.is_error());
                    hook.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("backend down")) })
            .await;

        assert_eq!(outcome.as_value().map(String::as_str), Some("cached"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unhandled_outcome_passes_through() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_fallback(
                FallbackStrategyOptions::with_value(0u32)
                    .with_should_handle(PredicateBuilder::new().handle_kind(ErrorKind::Timeout)),
            )
            .build()
            .unwrap();

        let value = pipeline.execute(|_| async { Outcome::value(7u32) }).await;
        assert_eq!(value.as_value(), Some(&7));

        let failure = pipeline
            .execute(|_| async { Outcome::<u32>::failure(anyhow::anyhow!("other")) })
            .await;
        assert_eq!(failure.error_kind(), Some(ErrorKind::Failure));
    }

    #[tokio::test]
    async fn test_action_can_reraise() {
        let pipeline = ResiliencePipelineBuilder::<u32>::new()
            .add_fallback(FallbackStrategyOptions::with_action(|outcome, _| async move {
                match outcome {
                    Outcome::Error(ResilienceError::Failure(e)) if e.to_string() == "fatal" => {
                        Outcome::Error(ResilienceError::Failure(e))
                    }
                    _ => Outcome::value(0),
                }
            }))
            .build()
            .unwrap();

        let outcome = pipeline
            .execute(|_| async { Outcome::failure(anyhow::anyhow!("fatal")) })
            .await;
        assert_eq!(outcome.as_error().map(ToString::to_string).as_deref(), Some("fatal"));
    }

    #[tokio::test]
    async fn test_stacked_fallbacks_degrade_gracefully() {
        let pipeline = ResiliencePipelineBuilder::new()
            .add_fallback(FallbackStrategyOptions::with_value("service unavailable"))
            .add_fallback(
                FallbackStrategyOptions::with_value("circuit open, try later")
                    .with_should_handle(PredicateBuilder::new().handle_kind(ErrorKind::BrokenCircuit)),
            )
            .build()
            .unwrap();

        let broken = pipeline
            .execute(|_| async {
                Outcome::<&str>::error(ResilienceError::BrokenCircuit { retry_after: None })
            })
            .await;
        assert_eq!(broken.as_value(), Some(&"circuit open, try later"));

        let other = pipeline
            .execute(|_| async { Outcome::<&str>::failure(anyhow::anyhow!("boom")) })
            .await;
        assert_eq!(other.as_value(), Some(&"service unavailable"));
    }
}
