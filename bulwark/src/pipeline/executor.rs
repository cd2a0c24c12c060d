//! Executable resilience pipelines.

use super::component::{Callback, ContextCallback, Next, ResilienceStrategy, TokenCallback};
use crate::cancellation::CancellationToken;
use crate::context::{ResilienceContext, ResilienceContextPool};
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug_span, Instrument};

/// Value type of untyped pipelines.
pub type AnyResult = Box<dyn Any + Send>;

/// An immutable, ordered composition of resilience strategies.
///
/// Pipelines are cheap to clone and safe to execute concurrently. The first
/// strategy added to the [`ResiliencePipelineBuilder`](super::ResiliencePipelineBuilder)
/// is the outermost one.
pub struct ResiliencePipeline<T: Send + 'static> {
    inner: Arc<PipelineInner<T>>,
}

struct PipelineInner<T: Send + 'static> {
    name: Option<String>,
    strategies: Vec<Arc<dyn ResilienceStrategy<T>>>,
    telemetry: StrategyTelemetry,
}

impl<T: Send + 'static> Clone for ResiliencePipeline<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ResiliencePipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePipeline")
            .field("name", &self.inner.name)
            .field("strategies", &self.inner.strategies.len())
            .finish()
    }
}

impl<T: Send + 'static> ResiliencePipeline<T> {
    pub(crate) fn new(
        name: Option<String>,
        strategies: Vec<Arc<dyn ResilienceStrategy<T>>>,
        telemetry: StrategyTelemetry,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                name,
                strategies,
                telemetry,
            }),
        }
    }

    /// A pipeline without strategies; executing it runs the callable once.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(None, Vec::new(), StrategyTelemetry::disabled())
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns the number of strategies.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.inner.strategies.len()
    }

    /// Returns true if the pipeline has no strategies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.strategies.is_empty()
    }

    /// Executes `f` on a pooled context.
    ///
    /// The callable receives the cancellation token of the current attempt
    /// and may return an [`Outcome`] or any `Result` convertible into one.
    pub async fn execute<F, Fut>(&self, f: F) -> Outcome<T>
    where
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync,
        Fut: Future + Send,
        Fut::Output: Into<Outcome<T>>,
    {
        let mut ctx = ResilienceContextPool::shared().get();
        self.run(&mut ctx, &TokenCallback::new(f)).await
    }

    /// Executes `f` on a pooled context observing the caller's token.
    pub async fn execute_cancellable<F, Fut>(
        &self,
        token: Arc<CancellationToken>,
        f: F,
    ) -> Outcome<T>
    where
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync,
        Fut: Future + Send,
        Fut::Output: Into<Outcome<T>>,
    {
        let mut ctx = ResilienceContextPool::shared().get_with_cancellation(token);
        self.run(&mut ctx, &TokenCallback::new(f)).await
    }

    /// Executes `f` on a caller-owned context.
    ///
    /// Properties set by the strategies (and by `f`'s surroundings) remain
    /// on `ctx` afterwards, as do the reported events.
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use bulwark::context::ResilienceContext;
    /// use bulwark::{Outcome, ResiliencePipeline};
    /// use futures::FutureExt;
    ///
    /// let pipeline = ResiliencePipeline::<String>::empty();
    /// let mut ctx = ResilienceContext::new().with_operation_key("greet");
    ///
    /// let outcome = pipeline
    ///     .execute_with_context(&mut ctx, |ctx| {
    ///         async move { Outcome::value(format!("hello {}", ctx.operation_key().unwrap_or("?"))) }
    ///             .boxed()
    ///     })
    ///     .await;
    /// assert_eq!(outcome.as_value().map(String::as_str), Some("hello greet"));
    /// # });
    /// ```
    pub async fn execute_with_context<F>(&self, ctx: &mut ResilienceContext, f: F) -> Outcome<T>
    where
        F: for<'c> Fn(&'c ResilienceContext) -> BoxFuture<'c, Outcome<T>> + Send + Sync,
    {
        self.run(ctx, &ContextCallback::new(f)).await
    }

    async fn run(&self, ctx: &mut ResilienceContext, callback: &dyn Callback<T>) -> Outcome<T> {
        let span = debug_span!(
            "resilience_pipeline",
            pipeline = self.inner.name.as_deref().unwrap_or("-"),
            operation_key = ctx.operation_key().unwrap_or("-"),
            execution_id = %ctx.execution_id(),
        );

        async move {
            let telemetry = &self.inner.telemetry;
            let event = telemetry.event(ctx, names::PIPELINE_EXECUTING, Severity::Debug);
            telemetry.report(ctx, event);

            let started = Instant::now();
            let outcome = Next::new(&self.inner.strategies, callback).run(ctx).await;

            let severity = if outcome.is_error() {
                Severity::Warning
            } else {
                Severity::Information
            };
            let event = telemetry
                .event(ctx, names::PIPELINE_EXECUTED, severity)
                .with_outcome(&outcome)
                .with_duration(started.elapsed());
            telemetry.report(ctx, event);

            outcome
        }
        .instrument(span)
        .await
    }
}

impl ResiliencePipeline<AnyResult> {
    /// Executes a callable producing `R` through an untyped pipeline.
    ///
    /// A strategy that substitutes a value of another type (an untyped
    /// fallback, for example) yields a failure rather than a panic.
    pub async fn execute_any<R, F, Fut>(&self, f: F) -> Outcome<R>
    where
        R: Send + 'static,
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync,
        Fut: Future + Send,
        Fut::Output: Into<Outcome<R>>,
    {
        let outcome = self
            .execute(|token| {
                let attempt = f(token);
                async move {
                    let outcome: Outcome<R> = attempt.await.into();
                    outcome.map(|value| Box::new(value) as AnyResult)
                }
            })
            .await;

        outcome.and_then(|value| match value.downcast::<R>() {
            Ok(value) => Outcome::Value(*value),
            Err(_) => Outcome::failure(anyhow::anyhow!(
                "untyped pipeline produced a value that is not a {}",
                std::any::type_name::<R>()
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RETRY_ATTEMPT;
    use crate::errors::ErrorKind;
    use crate::telemetry::ResilienceEvent;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_empty_pipeline_runs_callable_once() {
        let pipeline = ResiliencePipeline::<u32>::empty();
        let outcome = pipeline.execute(|_| async { Outcome::value(5) }).await;
        assert_eq!(outcome.as_value(), Some(&5));
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn test_callable_may_return_result() {
        let pipeline = ResiliencePipeline::<u32>::empty();
        let outcome = pipeline
            .execute(|_| async { Err::<u32, _>(std::io::Error::other("refused")) })
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Failure));
    }

    #[tokio::test]
    async fn test_execute_with_context_keeps_events() {
        let pipeline = ResiliencePipeline::<u32>::empty();
        let mut ctx = ResilienceContext::new();
        ctx.properties_mut().set(&RETRY_ATTEMPT, 9);

        let outcome = pipeline
            .execute_with_context(&mut ctx, |ctx| {
                let seen = ctx.properties().get_or(&RETRY_ATTEMPT, 0);
                async move { Outcome::value(seen) }.boxed()
            })
            .await;

        assert_eq!(outcome.as_value(), Some(&9));
        assert_eq!(
            ctx.events(),
            &[
                ResilienceEvent::new(names::PIPELINE_EXECUTING, Severity::Debug),
                ResilienceEvent::new(names::PIPELINE_EXECUTED, Severity::Information),
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_cancellable_passes_caller_token() {
        let pipeline = ResiliencePipeline::<bool>::empty();
        let token = Arc::new(CancellationToken::new());
        token.cancel("caller");

        let outcome = pipeline
            .execute_cancellable(token, |token| async move { Outcome::value(token.is_cancelled()) })
            .await;
        assert_eq!(outcome.as_value(), Some(&true));
    }

    #[tokio::test]
    async fn test_execute_any_roundtrip() {
        let pipeline = ResiliencePipeline::<AnyResult>::empty();
        let outcome = pipeline
            .execute_any(|_| async { Outcome::value("text".to_string()) })
            .await;
        assert_eq!(outcome.as_value().map(String::as_str), Some("text"));
    }
}
