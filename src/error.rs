//! Error types for bucket construction and lifecycle misuse
//!
//! Consumer operations (`consume`, `is_exhausted`, `available`) never fail;
//! inputs are clamped instead. Only building a bucket and driving its refill
//! loop out of order produce errors.
use std::time::Duration;
use thiserror::Error;

/// Errors produced by [`TokenBucket`](crate::TokenBucket) and [`BucketConfig`](crate::BucketConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketError {
    /// Tokens per interval must be > 0.
    #[error("tokens_per_interval must be > 0 (got {provided})")]
    InvalidRate {
        /// Value provided by caller.
        provided: u64,
    },
    /// Limit multiplier must be > 0.
    #[error("limit must be > 0 (got {provided})")]
    InvalidLimit {
        /// Value provided by caller.
        provided: u64,
    },
    /// `limit * tokens_per_interval` does not fit in a `u64`.
    #[error("max tokens overflow ({limit} x {tokens_per_interval})")]
    CapacityOverflow {
        /// Limit multiplier.
        limit: u64,
        /// Tokens granted per interval.
        tokens_per_interval: u64,
    },
    /// Interval too short to split into refill windows.
    #[error("interval must be at least {min:?} (got {provided:?})")]
    InvalidInterval {
        /// Value provided by caller.
        provided: Duration,
        /// Smallest accepted interval.
        min: Duration,
    },
    /// `start` was called while the refill loop is already running.
    #[error("refill loop is already running")]
    AlreadyRunning,
    /// `start` was called after `stop`; a stopped bucket cannot be restarted.
    #[error("bucket has been stopped")]
    Stopped,
    /// The timer or sink was replaced after the bucket was cloned.
    #[error("bucket is shared; configure timer and sink before cloning")]
    Shared,
    /// The refill worker could not be spawned.
    #[error("failed to spawn refill worker: {reason}")]
    Spawn {
        /// Underlying OS or runtime error, rendered.
        reason: String,
    },
}

impl BucketError {
    /// Check if this error comes from configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidRate { .. }
                | Self::InvalidLimit { .. }
                | Self::CapacityOverflow { .. }
                | Self::InvalidInterval { .. }
        )
    }

    /// Check if this error comes from calling lifecycle methods out of order.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::Stopped | Self::Shared)
    }
}
