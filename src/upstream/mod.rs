//! Upstream request limiting.
//!
//! The cache never talks to the network itself; fetch closures do. Every
//! closure is expected to wrap its outbound call in the process-wide
//! [`RequestLimiter`] so foreground fetches and background revalidation
//! together never exceed the configured number of concurrent requests
//! against the rate-limited upstream API.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::UpstreamSettings;

/// Process-wide cap on concurrent outbound requests.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl RequestLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn from_settings(settings: &UpstreamSettings) -> Self {
        Self::new(settings.max_concurrent_requests)
    }

    /// Run `op` while holding one of the limiter's permits. Callers queue
    /// when the limit is reached; the permit is released when `op`
    /// completes, whatever its outcome.
    pub async fn run<F, Fut, R>(&self, op: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        // The semaphore lives for the limiter's lifetime and is never
        // closed, so acquisition only fails after process teardown began.
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("request limiter semaphore is never closed");
        op().await
    }

    /// Configured maximum number of concurrent requests.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limiter_caps_concurrency() {
        let limiter = RequestLimiter::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(|| async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.available(), 3);
    }

    #[tokio::test]
    async fn zero_limit_clamps_to_one() {
        let limiter = RequestLimiter::new(0);
        assert_eq!(limiter.limit(), 1);
        let result = limiter.run(|| async { 7 }).await;
        assert_eq!(result, 7);
    }

    #[test]
    fn settings_carry_the_default_limit() {
        let limiter = RequestLimiter::from_settings(&UpstreamSettings::default());
        assert_eq!(limiter.limit(), 10);
        assert_eq!(limiter.available(), 10);
    }
}
