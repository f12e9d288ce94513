use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::IngestError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Minimum spacing between two calls to the same provider in bulk mode.
pub const MIN_CALL_SPACING: Duration = Duration::from_millis(200);

struct LimiterState {
    timestamps: VecDeque<Instant>,
    last_call: Option<Instant>,
}

/// Sliding-window rate limiter with per-call pacing: at most `max_requests`
/// per `window`, and never two calls closer than [`MIN_CALL_SPACING`].
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<LimiterState>>,
    max_requests: usize,
    window: Duration,
    min_spacing: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimiterState {
                timestamps: VecDeque::new(),
                last_call: None,
            })),
            max_requests,
            window,
            min_spacing: MIN_CALL_SPACING,
        }
    }

    #[cfg(test)]
    pub fn with_spacing(max_requests: usize, window: Duration, min_spacing: Duration) -> Self {
        let mut limiter = Self::new(max_requests, window);
        limiter.min_spacing = min_spacing;
        limiter
    }

    /// Wait for a call slot, or bail out on cancellation.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), IngestError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                while let Some(&front) = state.timestamps.front() {
                    if now.saturating_duration_since(front) >= self.window {
                        state.timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                let spacing_wait = state
                    .last_call
                    .map(|last| (last + self.min_spacing).saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);

                if state.timestamps.len() < self.max_requests && spacing_wait.is_zero() {
                    state.timestamps.push_back(now);
                    state.last_call = Some(now);
                    return Ok(());
                }

                let window_wait = if state.timestamps.len() >= self.max_requests {
                    state
                        .timestamps
                        .front()
                        .map(|&front| {
                            (front + self.window).saturating_duration_since(now)
                                + Duration::from_millis(50)
                        })
                        .unwrap_or(Duration::ZERO)
                } else {
                    Duration::ZERO
                };

                spacing_wait.max(window_wait)
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn enforces_call_spacing() {
        let limiter = RateLimiter::with_spacing(100, Duration::from_secs(60), MIN_CALL_SPACING);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();

        assert!(start.elapsed() >= MIN_CALL_SPACING * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_window_cap() {
        let limiter = RateLimiter::with_spacing(2, Duration::from_secs(1), Duration::ZERO);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        // Third call must wait for the window to slide.
        limiter.acquire(&cancel).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let limiter = RateLimiter::with_spacing(1, Duration::from_secs(600), Duration::ZERO);
        let cancel = CancellationToken::new();

        limiter.acquire(&cancel).await.unwrap();
        cancel.cancel();
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert_eq!(err.category(), "cancelled");
    }
}
