//! Concurrency limiter (bulkhead) strategy.
//!
//! A [`ConcurrencyLimiter`] owns `permit_limit` permits and a wait queue of
//! `queue_limit` slots. Calls that find neither a free permit nor a free
//! queue slot are rejected with [`ResilienceError::Throttled`] without
//! running. Waiters are served in arrival order.

use crate::cancellation::CancellationToken;
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::pipeline::{Next, ResilienceStrategy};
use crate::telemetry::{names, Severity, StrategyTelemetry};
use crate::Outcome;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Why a permit could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// Permits and queue are both exhausted.
    Rejected,
    /// Cancellation was requested while queued.
    Cancelled(String),
}

/// A permit held for the duration of one execution.
///
/// Dropping the lease returns the permit.
#[derive(Debug)]
pub struct ConcurrencyLease {
    _permit: OwnedSemaphorePermit,
}

/// A shareable permit pool with a bounded FIFO wait queue.
///
/// One limiter can guard several pipelines; independent limiters never
/// affect each other.
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    permit_limit: usize,
    queue_limit: usize,
    queued: Mutex<usize>,
}

impl fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("permit_limit", &self.permit_limit)
            .field("queue_limit", &self.queue_limit)
            .field("available_permits", &self.available_permits())
            .field("queued", &self.queued_count())
            .finish()
    }
}

struct QueueSlot<'a> {
    queued: &'a Mutex<usize>,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        let mut queued = self.queued.lock();
        *queued = queued.saturating_sub(1);
    }
}

impl ConcurrencyLimiter {
    /// Creates a limiter.
    ///
    /// # Panics
    ///
    /// Panics if `permit_limit` exceeds [`Semaphore::MAX_PERMITS`]. Pipelines
    /// built from [`ConcurrencyLimiterOptions`] reject such limits during
    /// validation instead.
    #[must_use]
    pub fn new(permit_limit: usize, queue_limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(permit_limit)),
            permit_limit,
            queue_limit,
            queued: Mutex::new(0),
        }
    }

    /// Returns the configured permit count.
    #[must_use]
    pub fn permit_limit(&self) -> usize {
        self.permit_limit
    }

    /// Returns the configured queue length.
    #[must_use]
    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    /// Returns the number of free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Returns the number of queued callers.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        *self.queued.lock()
    }

    /// Acquires a permit, queueing if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Rejected`] when the queue is full and
    /// [`AcquireError::Cancelled`] when `token` is cancelled while queued.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<ConcurrencyLease, AcquireError> {
        let slot = {
            let mut queued = self.queued.lock();
            if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
                return Ok(ConcurrencyLease { _permit: permit });
            }
            if *queued >= self.queue_limit {
                return Err(AcquireError::Rejected);
            }
            *queued += 1;
            QueueSlot {
                queued: &self.queued,
            }
        };

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(AcquireError::Cancelled(
                token.reason().unwrap_or_else(|| "cancelled while queued".to_string()),
            )),
            permit = Arc::clone(&self.permits).acquire_owned() => permit
                .map(|permit| ConcurrencyLease { _permit: permit })
                .map_err(|_| AcquireError::Rejected),
        };
        drop(slot);
        result
    }
}

/// Arguments passed to [`ConcurrencyLimiterOptions::on_rejected`].
#[derive(Debug)]
pub struct OnRejectedArguments<'a> {
    /// Context of the rejected execution.
    pub context: &'a ResilienceContext,
}

/// Hook invoked when a call is rejected.
pub type OnRejected = Arc<dyn Fn(&OnRejectedArguments<'_>) + Send + Sync>;

/// Options of the concurrency limiter strategy.
#[derive(Clone)]
pub struct ConcurrencyLimiterOptions {
    /// Name reported in telemetry.
    pub name: Option<String>,
    /// Concurrent executions allowed.
    pub permit_limit: usize,
    /// Executions allowed to wait for a permit.
    pub queue_limit: usize,
    /// Use this limiter instead of creating one from the limits above.
    pub limiter: Option<Arc<ConcurrencyLimiter>>,
    /// Hook invoked on rejection.
    pub on_rejected: Option<OnRejected>,
}

impl Default for ConcurrencyLimiterOptions {
    fn default() -> Self {
        Self {
            name: None,
            permit_limit: 1000,
            queue_limit: 0,
            limiter: None,
            on_rejected: None,
        }
    }
}

impl fmt::Debug for ConcurrencyLimiterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimiterOptions")
            .field("name", &self.name)
            .field("permit_limit", &self.permit_limit)
            .field("queue_limit", &self.queue_limit)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl ConcurrencyLimiterOptions {
    /// Creates options with the given limits.
    #[must_use]
    pub fn new(permit_limit: usize, queue_limit: usize) -> Self {
        Self {
            permit_limit,
            queue_limit,
            ..Self::default()
        }
    }

    /// Uses a shared limiter.
    #[must_use]
    pub fn shared(limiter: Arc<ConcurrencyLimiter>) -> Self {
        Self {
            permit_limit: limiter.permit_limit(),
            queue_limit: limiter.queue_limit(),
            limiter: Some(limiter),
            ..Self::default()
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the rejection hook.
    #[must_use]
    pub fn with_on_rejected<F>(mut self, on_rejected: F) -> Self
    where
        F: Fn(&OnRejectedArguments<'_>) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Arc::new(on_rejected));
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns one message per violated rule.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.permit_limit < 1 {
            errors.push("permit_limit must be at least 1".to_string());
        }
        if self.permit_limit > Semaphore::MAX_PERMITS {
            errors.push(format!(
                "permit_limit must be at most {}",
                Semaphore::MAX_PERMITS
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// The concurrency limiter strategy.
pub struct ConcurrencyLimiterStrategy {
    limiter: Arc<ConcurrencyLimiter>,
    on_rejected: Option<OnRejected>,
    telemetry: StrategyTelemetry,
}

impl fmt::Debug for ConcurrencyLimiterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimiterStrategy")
            .field("limiter", &self.limiter)
            .field("has_on_rejected", &self.on_rejected.is_some())
            .finish_non_exhaustive()
    }
}

impl ConcurrencyLimiterStrategy {
    pub(crate) fn new(options: ConcurrencyLimiterOptions, telemetry: StrategyTelemetry) -> Self {
        let limiter = options
            .limiter
            .unwrap_or_else(|| Arc::new(ConcurrencyLimiter::new(options.permit_limit, options.queue_limit)));
        Self {
            limiter,
            on_rejected: options.on_rejected,
            telemetry,
        }
    }

    /// Returns the limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<T: Send + 'static> ResilienceStrategy<T> for ConcurrencyLimiterStrategy {
    async fn execute(&self, ctx: &mut ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        let token = Arc::clone(ctx.cancellation());
        let _lease = match self.limiter.acquire(&token).await {
            Ok(lease) => lease,
            Err(AcquireError::Cancelled(reason)) => return Outcome::cancelled(reason),
            Err(AcquireError::Rejected) => {
                warn!(
                    permit_limit = self.limiter.permit_limit(),
                    queue_limit = self.limiter.queue_limit(),
                    "Concurrency limiter rejected execution"
                );
                if let Some(on_rejected) = &self.on_rejected {
                    on_rejected(&OnRejectedArguments { context: ctx });
                }
                let event = self
                    .telemetry
                    .event(ctx, names::ON_RATE_LIMITER_REJECTED, Severity::Error);
                self.telemetry.report(ctx, event);
                return Outcome::error(ResilienceError::Throttled { retry_after: None });
            }
        };

        next.run(ctx).await
    }
}
