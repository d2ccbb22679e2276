//! Reconnect Backoff
//!
//! Exponential backoff with bounded jitter around store reconnection.
//! While the cooldown deadline has not passed, the client fails fast rather
//! than blocking the accounting path on a dead cache.
//!
//! Delay schedule: `min(max_delay, base * 2^(attempt-1))`, then a uniformly
//! random ±`jitter` fraction is applied. The attempt counter resets to zero
//! on a successful reconnect, so a recovered store starts over at the base
//! delay.

use std::time::{Duration, Instant};

/// Delay parameters for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Ceiling for the exponential schedule.
    pub max: Duration,
    /// Jitter fraction in `[0, 1]`, applied as ± around the raw delay.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// The un-jittered delay for the given attempt (1-based).
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // Saturate the shift; 2^63 ms already dwarfs any sane ceiling.
        let exp = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let millis = self
            .base
            .as_millis()
            .saturating_mul(factor as u128)
            .min(self.max.as_millis());
        Duration::from_millis(millis as u64)
    }

    /// The delay for the given attempt with jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        if self.jitter <= 0.0 || raw.is_zero() {
            return raw;
        }
        // Uniform in [-jitter, +jitter].
        let spread = (rand::random::<f64>() * 2.0 - 1.0) * self.jitter;
        let millis = raw.as_millis() as f64 * (1.0 + spread);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Tracks consecutive failures and the cooldown deadline.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            retry_at: None,
        }
    }

    /// Records a failure and arms the cooldown. Returns the chosen delay.
    pub fn failure(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.policy.delay(self.attempt);
        self.retry_at = Some(Instant::now() + delay);
        delay
    }

    /// Records a successful connection: the schedule starts over.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.retry_at = None;
    }

    /// Time left in the cooldown, or `None` when a new attempt is allowed.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let retry_at = self.retry_at?;
        let now = Instant::now();
        if now >= retry_at {
            None
        } else {
            Some(retry_at - now)
        }
    }

    /// Number of consecutive failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
