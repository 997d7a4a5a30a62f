//! Convenient re-exports for common Windowed Bucket types.
pub use crate::{
    bucket::{BucketState, RefillHandle, TokenBucket},
    config::BucketConfig,
    error::BucketError,
    events::{BucketEvent, BucketSink},
    rate_limit::{Decision, RateLimiter},
    timer::{BlockTimer, CancellableTimer},
};
