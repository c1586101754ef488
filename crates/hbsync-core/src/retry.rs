//! Retry policy shared by the login flow and the batch fetcher
//!
//! A [`RetryPolicy`] only computes delays; callers own the loop so they can
//! decide which errors are retryable and how cancellation is observed.
//!
//! - Login: up to 2 retries, linear backoff (2s, 4s)
//! - Batch: up to 3 retries, exponential backoff (1s, 2s, 4s), capped at 30s

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Shape of the delay curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * (n + 1)`
    Linear,
    /// `base * multiplier^n`
    Exponential,
}

/// Bounded retry schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Login retry schedule: 2 retries at 2s and 4s
    pub fn login() -> Self {
        Self::linear(2, Duration::from_secs(2))
    }

    /// Batch retry schedule: 3 retries at 1s, 2s, 4s, never above 30s
    pub fn batch() -> Self {
        Self::exponential(3, Duration::from_secs(1), Duration::from_secs(30))
    }

    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: 1.0,
            max_delay: base_delay.saturating_mul(max_retries.max(1)),
            backoff: Backoff::Linear,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier: 2.0,
            max_delay,
            backoff: Backoff::Exponential,
        }
    }

    /// Returns true if a failure after `retries_so_far` retries may be retried
    pub fn allows_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Delay before retry number `retry_index` (zero-based)
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let secs = match self.backoff {
            Backoff::Linear => base * f64::from(retry_index + 1),
            Backoff::Exponential => base * self.multiplier.powi(retry_index as i32),
        };
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Delay before retry `retry_index`, raised (never lowered) by a server hint
    ///
    /// The result never exceeds `max_delay`.
    pub fn delay_with_hint(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self.delay_for(retry_index);
        match retry_after {
            Some(hint) if hint > computed => hint.min(self.max_delay),
            _ => computed,
        }
    }
}

/// Sleeps for `delay` unless `cancel` fires first
///
/// Returns `false` if the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
