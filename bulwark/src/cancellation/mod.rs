//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is carried by every
//! [`ResilienceContext`](crate::context::ResilienceContext). Strategies that
//! need to cancel only the inner part of an execution (timeout, hedging)
//! derive linked child tokens from it.

mod token;

pub use token::{CancelCallback, CancellationToken};
