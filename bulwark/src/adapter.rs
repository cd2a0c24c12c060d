//! Execution strategies for persistence adapters.
//!
//! A storage adapter that supports retries takes an [`ExecutionStrategy`]
//! instead of running its own retry loop. [`PipelineExecutionStrategy`]
//! routes every operation through a resilience pipeline, so the pipeline is
//! the only place where retries and timeouts are decided.
//! [`NoRetryExecutionStrategy`] runs each operation exactly once, for
//! adapters whose operations are not safe to replay.

use crate::cancellation::CancellationToken;
use crate::errors::ResilienceError;
use crate::outcome::Outcome;
use crate::pipeline::ResiliencePipeline;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A replayable unit of work.
///
/// The callable receives the cancellation token of the current attempt and
/// may be invoked more than once.
pub type Operation<T> =
    Arc<dyn Fn(Arc<CancellationToken>) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Runs adapter operations under a retry policy.
#[async_trait]
pub trait ExecutionStrategy<T: Send + 'static>: Send + Sync {
    /// Returns true if failed operations may be run again.
    ///
    /// Adapters use this to refuse user-initiated transactions, which cannot
    /// be replayed safely.
    fn retries_on_failure(&self) -> bool;

    /// Runs `operation` and returns its final result.
    async fn execute_operation(&self, operation: Operation<T>) -> Result<T, ResilienceError>;
}

/// Execution strategy backed by a resilience pipeline.
pub struct PipelineExecutionStrategy<T: Send + 'static> {
    pipeline: ResiliencePipeline<T>,
    retries_on_failure: bool,
}

impl<T: Send + 'static> Clone for PipelineExecutionStrategy<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            retries_on_failure: self.retries_on_failure,
        }
    }
}

impl<T: Send + 'static> fmt::Debug for PipelineExecutionStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutionStrategy")
            .field("pipeline", &self.pipeline.name())
            .field("retries_on_failure", &self.retries_on_failure)
            .finish()
    }
}

impl<T: Send + 'static> PipelineExecutionStrategy<T> {
    /// Creates a strategy that runs operations through `pipeline`.
    ///
    /// The pipeline is assumed to retry; use
    /// [`with_retries_on_failure`](Self::with_retries_on_failure) to
    /// declare otherwise.
    #[must_use]
    pub fn new(pipeline: ResiliencePipeline<T>) -> Self {
        Self {
            pipeline,
            retries_on_failure: true,
        }
    }

    /// Declares whether the pipeline replays failed operations.
    #[must_use]
    pub fn with_retries_on_failure(mut self, retries: bool) -> Self {
        self.retries_on_failure = retries;
        self
    }

    /// Returns the pipeline operations run through.
    #[must_use]
    pub fn pipeline(&self) -> &ResiliencePipeline<T> {
        &self.pipeline
    }

    /// Runs `operation` with `state` through the pipeline.
    ///
    /// Each attempt receives its own clone of `state`.
    pub async fn execute_with_state<S, F, Fut>(&self, state: S, operation: F) -> Result<T, ResilienceError>
    where
        S: Clone + Send + Sync,
        F: Fn(S, Arc<CancellationToken>) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        let outcome = self
            .pipeline
            .execute(|token| operation(state.clone(), token))
            .await;
        log_failure(self.pipeline.name(), &outcome);
        outcome.into_result()
    }
}

#[async_trait]
impl<T: Send + 'static> ExecutionStrategy<T> for PipelineExecutionStrategy<T> {
    fn retries_on_failure(&self) -> bool {
        self.retries_on_failure
    }

    async fn execute_operation(&self, operation: Operation<T>) -> Result<T, ResilienceError> {
        let outcome = self.pipeline.execute(|token| operation(token)).await;
        log_failure(self.pipeline.name(), &outcome);
        outcome.into_result()
    }
}

/// Execution strategy that runs each operation exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryExecutionStrategy;

impl NoRetryExecutionStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<T: Send + 'static> ExecutionStrategy<T> for NoRetryExecutionStrategy {
    fn retries_on_failure(&self) -> bool {
        false
    }

    async fn execute_operation(&self, operation: Operation<T>) -> Result<T, ResilienceError> {
        let token = Arc::new(CancellationToken::new());
        let outcome: Outcome<T> = operation(token).await.into();
        if let Some(error) = outcome.as_error() {
            debug!(error = %error, "Operation failed without retry");
        }
        outcome.into_result()
    }
}

fn log_failure<T>(pipeline: Option<&str>, outcome: &Outcome<T>) {
    if let Some(error) = outcome.as_error() {
        warn!(
            pipeline = pipeline.unwrap_or("-"),
            kind = %error.kind(),
            error = %error,
            "Operation failed after resilience pipeline"
        );
    }
}
