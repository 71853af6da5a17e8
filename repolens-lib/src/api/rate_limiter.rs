use core::time::Duration;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Log target for the rate limiter
const LOG_TARGET: &str = "  throttle";

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request throttle.
///
/// At most `requests_per_minute` calls to [`RateLimiter::wait_if_needed`] complete within any
/// trailing 60-second window. The lock is held while waiting, so concurrent callers reserve
/// slots one at a time in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    enabled: bool,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_minute: u32, enabled: bool) -> Self {
        Self {
            limit: usize::try_from(requests_per_minute).unwrap_or(usize::MAX).max(1),
            enabled,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until another request fits in the window, then records it.
    pub async fn wait_if_needed(&self) {
        if !self.enabled {
            return;
        }

        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while issued.front().is_some_and(|&t| now.duration_since(t) >= WINDOW) {
                let _ = issued.pop_front();
            }

            if issued.len() < self.limit {
                break;
            }

            if let Some(&oldest) = issued.front() {
                let wait = WINDOW.saturating_sub(now.duration_since(oldest));
                log::debug!(target: LOG_TARGET, "Rate limit of {} requests per minute reached, waiting {}ms", self.limit, wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        issued.push_back(Instant::now());
    }

    /// Number of requests recorded in the current window.
    pub async fn in_window(&self) -> usize {
        let now = Instant::now();
        self.issued.lock().await.iter().filter(|&&t| now.duration_since(t) < WINDOW).count()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_limit() {
        let limiter = RateLimiter::new(5, true);
        let mut completed = Vec::new();

        for _ in 0..17 {
            limiter.wait_if_needed().await;
            completed.push(Instant::now());
        }

        for (i, start) in completed.iter().enumerate() {
            let in_window = completed[i..].iter().filter(|&&t| t.duration_since(*start) < WINDOW).count();
            assert!(in_window <= 5, "window starting at call {i} saw {in_window} calls");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_limit_does_not_wait() {
        let limiter = RateLimiter::new(10, true);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait_if_needed().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_leave_window() {
        let limiter = RateLimiter::new(2, true);
        let start = Instant::now();
        limiter.wait_if_needed().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.wait_if_needed().await;

        limiter.wait_if_needed().await;
        assert_eq!(start.elapsed(), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_is_a_no_op() {
        let limiter = RateLimiter::new(1, false);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait_if_needed().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_the_window() {
        let limiter = std::sync::Arc::new(RateLimiter::new(3, true));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.wait_if_needed().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }

        let early = times.iter().filter(|&&t| t.duration_since(start) < WINDOW).count();
        assert_eq!(early, 3);
    }
}
