//! Backoff and failure budget for exchange fetches.

use std::time::Duration;

/// Wait between a failed page request and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same wait every time.
    Fixed { delay: Duration },
    /// `min(base * factor^attempt + random(0..=jitter), max)`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        /// Upper bound of the random extra wait.
        jitter: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Wait before retry number `attempt`, counted from zero.
    pub fn delay(self, attempt: u32) -> Duration {
        let (base, factor, max, jitter) = match self {
            Self::Fixed { delay } => return delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => (base, factor, max, jitter),
        };

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut wait_secs = base.as_secs_f64() * factor.powi(exponent);
        let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms > 0 {
            wait_secs += fastrand::u64(0..=jitter_ms) as f64 / 1_000.0;
        }

        Duration::from_secs_f64(wait_secs.min(max.as_secs_f64()).max(0.0))
    }
}

/// Failure budget for one exchange fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts of one page request before it counts as a failure.
    pub request_retries: u32,
    /// Consecutive page failures after which the fetch returns partial data.
    pub max_consecutive_failures: u32,
    /// Shared by request retries and page failures.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            request_retries: 3,
            max_consecutive_failures: 10,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
