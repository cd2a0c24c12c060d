//! Cooperative cancellation signal shared by a pipeline execution.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// Callback run when a token is cancelled.
pub type CancelCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registrations {
    reason: Option<String>,
    callbacks: Vec<CancelCallback>,
    children: Vec<Weak<CancellationToken>>,
}

/// A cooperative cancellation signal.
///
/// The first reason passed to [`cancel`](Self::cancel) is kept; later calls
/// are ignored. Tokens created with [`child`](Self::child) follow their
/// parent, never the other way round. Strategies hand linked children to
/// attempts so that a timeout or a lost hedge cancels only its own attempt.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    registrations: Mutex<Registrations>,
    notify: Notify,
}

fn run_callback(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        warn!(panic = ?panic, "Cancellation callback panicked");
    }
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever `self` is.
    ///
    /// A child of an already cancelled token starts out cancelled with the
    /// parent's reason.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        let child = Arc::new(Self::new());
        let parent_reason = {
            let mut registrations = self.registrations.lock();
            if self.is_cancelled() {
                Some(registrations.reason.clone())
            } else {
                registrations.children.retain(|weak| weak.strong_count() > 0);
                registrations.children.push(Arc::downgrade(&child));
                None
            }
        };

        if let Some(reason) = parent_reason {
            child.cancel(reason.unwrap_or_else(|| "parent cancelled".to_string()));
        }
        child
    }

    /// Requests cancellation.
    ///
    /// Wakes every [`cancelled`](Self::cancelled) waiter, runs the
    /// registered callbacks and cancels linked children. A panicking
    /// callback is logged and does not stop the others.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let (callbacks, children) = {
            let mut registrations = self.registrations.lock();
            if self.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            registrations.reason = Some(reason.clone());
            (
                std::mem::take(&mut registrations.callbacks),
                std::mem::take(&mut registrations.children),
            )
        };
        self.notify.notify_waiters();

        for callback in &callbacks {
            run_callback(callback.as_ref());
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.as_str());
        }
    }

    /// Registers `callback` to run on cancellation.
    ///
    /// Runs it right away if the token is already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        {
            let mut registrations = self.registrations.lock();
            if !self.is_cancelled() {
                registrations.callbacks.push(Box::new(callback));
                return;
            }
        }
        run_callback(&callback);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the reason given to the first [`cancel`](Self::cancel) call.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.registrations.lock().reason.clone()
    }

    /// Completes once cancellation was requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Returns the token to its initial state for reuse by the context pool.
    pub fn reset(&self) {
        let mut registrations = self.registrations.lock();
        *registrations = Registrations::default();
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
