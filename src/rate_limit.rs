//! Rate limiting gate over a [`TokenBucket`].
//!
//! A throttled path usually asks "any tokens left?" and then reports what it
//! used. [`RateLimiter::acquire`] does both under one lock and returns a
//! [`Decision`]:
//! - [`Decision::Allowed`] carries the tokens left after consumption.
//! - [`Decision::Denied`] carries how long until tokens may return and why.
//!
//! Like [`TokenBucket::consume`], an allowed acquisition larger than what is
//! available drains the bucket to zero instead of being refused.

use crate::bucket::{BucketState, TokenBucket};
use std::time::Duration;

/// Reason reported when the running bucket has no tokens left.
pub const REASON_EXHAUSTED: &str = "bucket_exhausted";
/// Reason reported before the refill loop has started.
pub const REASON_NOT_STARTED: &str = "bucket_not_started";
/// Reason reported once the bucket is stopped; it will never refill.
pub const REASON_STOPPED: &str = "bucket_stopped";

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The work may proceed.
    Allowed {
        /// Tokens remaining after this acquisition.
        remaining: u64,
    },
    /// The work should be held back.
    Denied {
        /// How long the caller should wait before asking again.
        wait: Duration,
        /// Why the request was denied (one of the `REASON_*` constants).
        reason: &'static str,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Suggested wait for a denial, `None` when allowed.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            Decision::Denied { wait, .. } => Some(*wait),
            Decision::Allowed { .. } => None,
        }
    }
}

/// Core interface for gating work on a rate limit.
pub trait RateLimiter: Send + Sync {
    /// Attempt to take `permits` tokens.
    fn acquire(&self, permits: u64) -> Decision;
}

impl RateLimiter for TokenBucket {
    fn acquire(&self, permits: u64) -> Decision {
        let mut ledger = self.lock();
        if ledger.tokens > 0 {
            ledger.tokens = ledger.tokens.saturating_sub(permits);
            return Decision::Allowed { remaining: ledger.tokens };
        }
        match self.state() {
            BucketState::Running => {
                Decision::Denied { wait: self.next_refill_in(&ledger), reason: REASON_EXHAUSTED }
            }
            // The first window lands as soon as the loop starts.
            BucketState::Idle => Decision::Denied { wait: Duration::ZERO, reason: REASON_NOT_STARTED },
            BucketState::Stopped => Decision::Denied { wait: Duration::MAX, reason: REASON_STOPPED },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::timer::SteppedTimer;

    #[test]
    fn idle_bucket_denies_without_wait() {
        let bucket = TokenBucket::new(10).unwrap();
        let d = bucket.acquire(1);
        assert_eq!(d, Decision::Denied { wait: Duration::ZERO, reason: REASON_NOT_STARTED });
        assert!(!d.is_allowed());
    }

    #[test]
    fn stopped_bucket_denies_forever() {
        let bucket = TokenBucket::new(10).unwrap();
        bucket.stop();
        assert_eq!(bucket.acquire(1).wait(), Some(Duration::MAX));
    }

    #[test]
    fn running_bucket_allows_then_denies_until_refill() {
        let timer = SteppedTimer::new();
        let bucket = TokenBucket::new(10)
            .unwrap()
            .with_timer(timer.clone())
            .unwrap()
            .with_sink(NullSink)
            .unwrap();
        let handle = bucket.spawn().unwrap();
        assert!(timer.wait_blocked_timeout(Duration::from_secs(5)));

        assert_eq!(bucket.acquire(1), Decision::Allowed { remaining: 1 });
        assert_eq!(bucket.acquire(5), Decision::Allowed { remaining: 0 });

        match bucket.acquire(1) {
            Decision::Denied { wait, reason } => {
                assert_eq!(reason, REASON_EXHAUSTED);
                assert!(wait <= Duration::from_secs(10));
            }
            other => panic!("expected denied, got {other:?}"),
        }

        timer.tick();
        assert!(timer.wait_blocked_timeout(Duration::from_secs(5)));
        assert!(bucket.acquire(1).is_allowed());
        assert_eq!(bucket.acquire(1).wait(), None);

        handle.shutdown().unwrap();
    }
}
