//! Cooperative cancellation token carried through parse, batch, and store calls.
//!
//! Replaces exception-based or implicit cancellation: every suspension point
//! named in the concurrency model (before/after parse tasks, between micro-
//! batches, at store calls, during the rollback-completion poll, on semaphore
//! acquisition) checks [`CancelToken::is_cancelled`] and returns
//! [`Cancelled`] explicitly rather than unwinding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Error returned when a cancel token was observed tripped at a suspension point.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("operation was cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

/// A shareable cooperative cancellation flag.
///
/// Cloning gives another handle to the same underlying flag. Checking
/// cancellation is cheap (a single atomic load) so it can be done at every
/// suspension point without meaningfully affecting throughput.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns whether the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` if the token has been tripped, `Ok(())` otherwise.
    ///
    /// Call this at every suspension point named in the concurrency model.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Awaits cancellation without polling, for tasks parked on a suspension
    /// point that would otherwise block indefinitely (e.g. waiting on a
    /// semaphore permit).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_trips_shared_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("cancellation should be observed promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .expect("already-cancelled token must not block");
    }
}
