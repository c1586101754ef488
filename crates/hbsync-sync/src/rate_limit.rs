//! Sliding-window rate limiter
//!
//! Bounds outbound requests to a budget per trailing window (60 seconds by
//! default). Admission timestamps are kept in order; a caller that finds the
//! window full sleeps until the oldest admission leaves it. Unlike a fixed
//! bucket, this never lets 2N requests through around a bucket boundary.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use hbsync_core::config::RateLimitingConfig;

/// Length of the rolling window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Admits at most `budget` calls in any trailing [`WINDOW`]
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    budget: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    /// Creates a limiter admitting `requests_per_minute` calls per minute
    ///
    /// A budget of zero is treated as one.
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute as usize, WINDOW)
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(budget: usize, window: Duration) -> Self {
        let budget = budget.max(1);
        Self {
            budget,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(budget)),
        }
    }

    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(config.requests_per_minute)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of admissions still inside the window
    pub fn in_window(&self) -> usize {
        let mut admitted = self.lock();
        prune(&mut admitted, Instant::now(), self.window);
        admitted.len()
    }

    /// Waits until a call may proceed, then records it
    ///
    /// Never fails; it only delays. The wait is at most one window.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut admitted = self.lock();
                let now = Instant::now();
                prune(&mut admitted, now, self.window);

                if admitted.len() < self.budget {
                    admitted.push_back(now);
                    return;
                }

                match admitted.front() {
                    // A clock that went backward yields a zero wait
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                budget = self.budget,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        // The queue is valid after any panic mid-update
        self.admitted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops admissions that are a full window old or older
fn prune(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = admitted.front() {
        if now.saturating_duration_since(*oldest) >= window {
            admitted.pop_front();
        } else {
            break;
        }
    }
}
