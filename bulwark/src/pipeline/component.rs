//! The strategy seam of a pipeline.
//!
//! A pipeline is an ordered slice of [`ResilienceStrategy`] values. Each
//! strategy receives a [`Next`] handle for the rest of the chain and decides
//! whether, when and how often to run it.

use crate::cancellation::CancellationToken;
use crate::context::ResilienceContext;
use crate::Outcome;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A resilience behavior wrapping the rest of a pipeline.
///
/// Implementations must be `Send + Sync`: one pipeline serves concurrent
/// executions, so any state kept on the strategy itself is shared across
/// calls and needs its own synchronization. Per-call state belongs in the
/// [`ResilienceContext`].
///
/// ```
/// use async_trait::async_trait;
/// use bulwark::context::ResilienceContext;
/// use bulwark::pipeline::{Next, ResilienceStrategy};
/// use bulwark::Outcome;
///
/// struct Tagging;
///
/// #[async_trait]
/// impl ResilienceStrategy<String> for Tagging {
///     async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, String>) -> Outcome<String> {
///         next.run(ctx).await.map(|v| format!("[{v}]"))
///     }
/// }
/// ```
#[async_trait]
pub trait ResilienceStrategy<T: Send + 'static>: Send + Sync {
    /// Executes the strategy around `next`.
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T>;
}

/// The inner part of a pipeline, as seen by one strategy.
///
/// `Next` is `Copy`: a strategy may run it any number of times, including
/// concurrently on separate contexts.
pub struct Next<'a, T: Send + 'static> {
    rest: &'a [Arc<dyn ResilienceStrategy<T>>],
    callback: &'a dyn Callback<T>,
}

impl<T: Send + 'static> Clone for Next<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Send + 'static> Copy for Next<'_, T> {}

impl<T: Send + 'static> fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining_strategies", &self.rest.len())
            .finish()
    }
}

impl<'a, T: Send + 'static> Next<'a, T> {
    pub(crate) fn new(rest: &'a [Arc<dyn ResilienceStrategy<T>>], callback: &'a dyn Callback<T>) -> Self {
        Self { rest, callback }
    }

    /// Runs the next-inner strategy, or the user callable at the end of the
    /// chain.
    pub async fn run(self, ctx: &mut ResilienceContext) -> Outcome<T> {
        match self.rest.split_first() {
            Some((head, tail)) => head.execute(ctx, Next::new(tail, self.callback)).await,
            None => self.callback.call(ctx).await,
        }
    }
}

/// The user callable at the end of the chain.
#[async_trait]
pub(crate) trait Callback<T>: Send + Sync {
    async fn call(&self, ctx: &ResilienceContext) -> Outcome<T>;
}

/// Callable receiving the cancellation token of the current context.
pub(crate) struct TokenCallback<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> TokenCallback<F, Fut> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> Callback<T> for TokenCallback<F, Fut>
where
    T: Send + 'static,
    F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Into<Outcome<T>>,
{
    async fn call(&self, ctx: &ResilienceContext) -> Outcome<T> {
        (self.f)(Arc::clone(ctx.cancellation())).await.into()
    }
}

/// Callable receiving the context itself.
pub(crate) struct ContextCallback<F, T> {
    f: F,
    _result: PhantomData<fn() -> T>,
}

impl<F, T> ContextCallback<F, T> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _result: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Callback<T> for ContextCallback<F, T>
where
    T: Send + 'static,
    F: for<'c> Fn(&'c ResilienceContext) -> BoxFuture<'c, Outcome<T>> + Send + Sync,
{
    async fn call(&self, ctx: &ResilienceContext) -> Outcome<T> {
        (self.f)(ctx).await
    }
}
