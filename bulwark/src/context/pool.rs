//! Pooling of resilience contexts.

use super::ResilienceContext;
use crate::cancellation::CancellationToken;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

/// Default number of idle contexts a pool keeps.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// A bounded pool of reusable [`ResilienceContext`] values.
///
/// [`ResilienceContextPool::get`] hands out a [`PooledContext`] guard. The
/// guard resets the context and returns it to the pool when dropped, so a
/// context goes back exactly once on every exit path.
#[derive(Debug)]
pub struct ResilienceContextPool {
    idle: Mutex<Vec<ResilienceContext>>,
    capacity: usize,
}

impl ResilienceContextPool {
    /// Creates a pool that keeps at most `capacity` idle contexts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Returns the process-wide pool.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<ResilienceContextPool> = OnceLock::new();
        SHARED.get_or_init(|| Self::new(DEFAULT_POOL_CAPACITY))
    }

    /// Acquires a context with a fresh cancellation token.
    pub fn get(&self) -> PooledContext<'_> {
        let context = self.idle.lock().pop().unwrap_or_default();
        PooledContext {
            context: Some(context),
            pool: self,
        }
    }

    /// Acquires a context observing the caller's cancellation token.
    pub fn get_with_cancellation(&self, token: Arc<CancellationToken>) -> PooledContext<'_> {
        let mut pooled = self.get();
        pooled.replace_cancellation(token);
        pooled
    }

    /// Acquires a context with an operation key.
    pub fn get_with_operation_key(&self, key: impl Into<String>) -> PooledContext<'_> {
        let mut pooled = self.get();
        pooled.set_operation_key(Some(key.into()));
        pooled
    }

    /// Returns the number of idle contexts.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, mut context: ResilienceContext) {
        context.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(context);
        }
    }
}

impl Default for ResilienceContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// A context borrowed from a [`ResilienceContextPool`].
#[derive(Debug)]
pub struct PooledContext<'a> {
    context: Option<ResilienceContext>,
    pool: &'a ResilienceContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = ResilienceContext;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the context out.
        self.context.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.give_back(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RETRY_ATTEMPT;

    #[test]
    fn test_context_returned_on_drop() {
        let pool = ResilienceContextPool::new(4);
        {
            let _ctx = pool.get();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let _a = pool.get();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_returned_context_is_reset() {
        let pool = ResilienceContextPool::new(4);
        {
            let mut ctx = pool.get_with_operation_key("op");
            ctx.properties_mut().set(&RETRY_ATTEMPT, 3);
            ctx.cancellation().cancel("done");
        }

        let ctx = pool.get();
        assert!(ctx.properties().is_empty());
        assert!(ctx.operation_key().is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_returned_on_panic_path() {
        let pool = ResilienceContextPool::new(4);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = pool.get();
            panic!("callable blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let pool = ResilienceContextPool::new(1);
        {
            let _a = pool.get();
            let _b = pool.get();
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_caller_token_observed() {
        let pool = ResilienceContextPool::new(1);
        let token = Arc::new(CancellationToken::new());
        let ctx = pool.get_with_cancellation(token.clone());
        token.cancel("caller");
        assert!(ctx.is_cancelled());
    }
}
