//! Cancellable reconnect timer
//!
//! Reconnects use a fixed delay with no attempt ceiling. A supervisor owns
//! exactly one timer; scheduling replaces any pending attempt, and logout
//! cancels it.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct ReconnectTimer {
    pending: Mutex<Option<CancellationToken>>,
}

impl ReconnectTimer {
    fn pending(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `attempt` after `delay` unless cancelled first.
    ///
    /// The attempt receives the token it was scheduled under and claims it
    /// with [`ReconnectTimer::fire`] once it holds whatever locks it needs.
    pub(crate) fn schedule<F, Fut>(&self, delay: Duration, attempt: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending().replace(token.clone()) {
            previous.cancel();
        }

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => attempt(token).await,
            }
        });
    }

    /// Claim a fired attempt. False when it was cancelled in the meantime;
    /// otherwise nothing is pending any more.
    pub(crate) fn fire(&self, token: &CancellationToken) -> bool {
        let mut pending = self.pending();
        if token.is_cancelled() {
            return false;
        }
        // A live token is the latest one: scheduling cancels its predecessor
        pending.take();
        token.cancel();
        true
    }

    /// Cancel the pending attempt. Returns whether one was pending.
    pub(crate) fn cancel(&self) -> bool {
        match self.pending().take() {
            Some(token) => {
                let was_pending = !token.is_cancelled();
                token.cancel();
                was_pending
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce(CancellationToken) -> std::future::Ready<()> {
        let fired = Arc::clone(fired);
        move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let timer = ReconnectTimer::default();
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(3), counting(&fired));
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_attempt() {
        let timer = ReconnectTimer::default();
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(3), counting(&fired));
        assert!(timer.cancel());
        assert!(!timer.is_pending());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_attempt_is_no_longer_pending() {
        let timer = Arc::new(ReconnectTimer::default());
        let claimed = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&timer);
        let count = Arc::clone(&claimed);
        timer.schedule(Duration::from_secs(3), move |token| async move {
            let first = inner.fire(&token);
            let second = inner.fire(&token);
            if first && !second {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(claimed.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_attempt() {
        let timer = ReconnectTimer::default();
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(3), counting(&fired));
        timer.schedule(Duration::from_secs(3), counting(&fired));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
