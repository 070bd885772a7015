//! Cancellable one-shot timer owned by the driver state

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};

/// At most one pending deadline; scheduling again replaces it.
#[derive(Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep_until(Instant::now() + after)));
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolves when the pending deadline passes, then clears it. Never
    /// resolves while nothing is scheduled.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_deadline() {
        let mut timer = Timer::new();
        timer.schedule(Duration::from_secs(3));
        let start = Instant::now();

        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_deadline() {
        let mut timer = Timer::new();
        timer.schedule(Duration::from_secs(10));
        timer.schedule(Duration::from_secs(2));
        let start = Instant::now();

        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = Timer::new();
        timer.schedule(Duration::from_secs(1));
        timer.cancel();

        let waited = tokio::time::timeout(Duration::from_secs(60), timer.fired()).await;
        assert!(waited.is_err());
        assert!(timer.deadline().is_none());
    }
}
