//! Cancellation token for one build.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::debug;

/// Cooperative stop signal shared by a build's gate and sink.
///
/// The first reason wins; later calls to [`CancellationToken::cancel`] are
/// ignored.
#[derive(Default)]
pub struct CancellationToken {
    set: AtomicBool,
    reason: Mutex<Option<String>>,
    waiters: Notify,
}

impl CancellationToken {
    /// Creates an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token and wakes everything waiting in
    /// [`CancellationToken::cancelled`].
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock();
        if slot.is_some() {
            return;
        }
        let reason = reason.into();
        debug!(reason = %reason, "Build cancellation requested");
        *slot = Some(reason);
        self.set.store(true, Ordering::Release);
        drop(slot);
        self.waiters.notify_waiters();
    }

    /// Returns true once the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// The reason given to the first `cancel` call.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Resolves once the token is tripped.
    pub async fn cancelled(&self) {
        let notified = self.waiters.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fresh_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("user abort");
        token.cancel("shutdown");

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("user abort"));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_every_waiter() {
        let token = Arc::new(CancellationToken::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("shutdown");

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter woke")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let token = CancellationToken::new();
        token.cancel("early");
        token.cancelled().await;
    }
}
