use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Rolling-window request gate shared by every caller of one client.
///
/// At most `max_calls` permits are handed out in any `window`. Callers queue on
/// the mutex in arrival order, so a burst of concurrent tasks is released one
/// slot at a time instead of racing each other.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_calls.max(1))),
        }
    }

    pub fn per_second(max_calls: u32) -> Self {
        Self::new(max_calls as usize, Duration::from_secs(1))
    }

    /// Waits until a call may go out and records it.
    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = issued.front() {
                if now.duration_since(oldest) >= self.window {
                    issued.pop_front();
                } else {
                    break;
                }
            }
            if issued.len() < self.max_calls {
                issued.push_back(now);
                return;
            }
            // The guard is held while sleeping: the next caller can only be
            // admitted after this one, which keeps admission order FIFO.
            let wait = issued
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or_default();
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_spread_over_windows() {
        let limiter = Arc::new(RateLimiter::per_second(3));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..9 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();
        assert!(times[2].duration_since(start) < Duration::from_millis(1));
        assert!(times[3].duration_since(start) >= Duration::from_secs(1));
        assert!(times[8].duration_since(start) >= Duration::from_secs(2));
    }
}
