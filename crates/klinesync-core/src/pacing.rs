//! Request pacing that keeps one exchange fetch under upstream rate limits.

use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Pacing knobs for one exchange client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Minimum spacing between two page requests. Zero disables spacing.
    pub request_interval: Duration,
    /// Every time the accumulated record count crosses a multiple of this
    /// value, the fetch pauses for `long_pause`. Zero disables the pause.
    pub long_pause_every: usize,
    pub long_pause: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            request_interval: Duration::from_millis(250),
            long_pause_every: 5_000,
            long_pause: Duration::from_secs(2),
        }
    }
}

impl PacingPolicy {
    pub const fn unpaced() -> Self {
        Self {
            request_interval: Duration::ZERO,
            long_pause_every: 0,
            long_pause: Duration::ZERO,
        }
    }
}

/// Per-client pacer: a single-cell rate limiter plus the periodic long pause.
#[derive(Clone)]
pub struct Pacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    policy: PacingPolicy,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        let limiter = Quota::with_period(policy.request_interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter, policy }
    }

    /// Waits until the next page request may be sent.
    pub async fn before_request(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Long pause owed after the record count went from `before` to `after`.
    pub fn pause_after(&self, before: usize, after: usize) -> Option<Duration> {
        let every = self.policy.long_pause_every;
        if every == 0 || self.policy.long_pause.is_zero() {
            return None;
        }
        (after / every > before / every).then_some(self.policy.long_pause)
    }
}
