//! Backoff Module
//!
//! Exponential backoff with proportional jitter, used between 429 retries.

use std::time::Duration;

/// Share of the capped delay that jitter may add on top.
pub const JITTER_RATIO: f64 = 0.1;

// == Backoff Policy ==
/// Exponential backoff curve: `min(base * multiplier^attempt, max_delay)`,
/// plus up to 10% random jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for the first retry
    pub base: Duration,
    /// Growth factor applied per attempt
    pub multiplier: f64,
    /// Ceiling applied before jitter
    pub max_delay: Duration,
}

impl BackoffPolicy {
    // == Constructor ==
    pub fn new(base: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base,
            multiplier,
            max_delay,
        }
    }

    // == Capped Delay ==
    /// Returns the capped delay for `attempt`, before jitter.
    ///
    /// Non-decreasing in `attempt` for any multiplier >= 1, and never above
    /// `max_delay`.
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let grown = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();

        if grown.is_nan() || grown >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(grown.max(0.0))
    }

    // == Delay With Jitter ==
    /// Returns the delay for `attempt` using the supplied jitter sample.
    ///
    /// `sample` is clamped to `[0, 1]`; the result lies in
    /// `[capped, capped * 1.1]`.
    pub fn delay_with_jitter(&self, attempt: u32, sample: f64) -> Duration {
        let capped = self.delay_without_jitter(attempt);
        let sample = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(0.0, 1.0)
        };
        capped + capped.mul_f64(JITTER_RATIO * sample)
    }

    // == Compute Delay ==
    /// Returns the delay to sleep before retrying after `attempt` failed.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }

    /// Upper bound of any delay this policy can produce.
    pub fn max_jittered_delay(&self) -> Duration {
        self.max_delay + self.max_delay.mul_f64(JITTER_RATIO)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(1000),
            2.0,
            Duration::from_millis(10_000),
        )
    }
}
