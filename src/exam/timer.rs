// src/exam/timer.rs

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Countdown for one exam phase.
///
/// The expiry callback runs on a background task unless the timer is
/// cancelled first. Dropping the timer cancels it.
#[derive(Debug)]
pub struct PhaseTimer {
    token: CancellationToken,
}

impl PhaseTimer {
    pub fn arm<F, Fut>(after: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => on_expire().await,
            }
        });
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
