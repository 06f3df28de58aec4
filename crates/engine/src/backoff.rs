use std::time::Duration;

use rand_core::{OsRng, RngCore};

/// Retry ladder for store requests that leave work unprocessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Retries allowed before giving up. Zero disables retrying.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 12,
        }
    }
}

/// Exponential backoff with jitter, bounded by an attempt ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Retries handed out so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next retry, or `None` once the ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(ladder_delay(&self.config, self.attempts, OsRng.next_u32()))
    }
}

/// Doubles from `min_delay` per attempt, keeps the upper half of the step and
/// spreads the lower half randomly, clamped to `[min_delay, max_delay]`.
fn ladder_delay(config: &BackoffConfig, attempt: u32, random: u32) -> Duration {
    let min = config.min_delay.as_millis().min(u128::from(u64::MAX)) as u64;
    let max = config.max_delay.as_millis().min(u128::from(u64::MAX)) as u64;
    let shift = attempt.saturating_sub(1).min(20);
    let step = min.saturating_mul(1u64 << shift).min(max);
    let half = step / 2;
    let jitter = if half == 0 {
        0
    } else {
        u64::from(random) % (half + 1)
    };
    Duration::from_millis((step - half + jitter).clamp(min.min(max), max))
}
