//! Execution context for pipeline runs.
//!
//! This module provides:
//! - The per-execution resilience context
//! - Typed ambient properties
//! - A pool of reusable contexts

mod execution;
mod pool;
mod properties;

pub use execution::{ResilienceContext, MAX_RETAINED_EVENTS};
pub use pool::{PooledContext, ResilienceContextPool, DEFAULT_POOL_CAPACITY};
pub use properties::{
    ResilienceProperties, ResiliencePropertyKey, HEDGING_ATTEMPT, RETRY_ATTEMPT,
};
