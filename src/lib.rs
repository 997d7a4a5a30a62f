#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Windowed Bucket
//!
//! A bounded token-bucket rate limiter for throttling an output path, such as
//! how much data a downstream sink may absorb per minute.
//!
//! ## Features
//!
//! - **Windowed refill**: `tokens_per_interval` is spread over six 10-second
//!   windows per minute, front-loading the remainder
//! - **Capacity ceiling** of `limit * tokens_per_interval`; excess refill is discarded
//! - **Cancellable refill loop** paced by a monitor-based timer, stoppable from any thread
//! - **Clamped consumption**: never negative, never an error
//! - **Pluggable timer and event sink** for deterministic tests and `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust
//! use windowed_bucket::{RateLimiter, TokenBucket};
//!
//! let bucket = TokenBucket::new(600).unwrap(); // 600 per minute, 100 per window
//! let refill = bucket.spawn().unwrap();
//!
//! # while bucket.is_exhausted() { std::thread::yield_now(); }
//! if bucket.acquire(40).is_allowed() {
//!     // write 40 units downstream
//! }
//!
//! refill.shutdown().unwrap();
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod events;
pub mod prelude;
pub mod rate_limit;
pub mod schedule;
pub mod timer;

// Re-exports
pub use bucket::{BucketState, RefillHandle, TokenBucket};
pub use config::{BucketConfig, BucketConfigBuilder};
pub use error::BucketError;
pub use events::{BucketEvent, BucketSink, LogSink, MemorySink, NullSink};
pub use rate_limit::{Decision, RateLimiter};
pub use schedule::{WindowSchedule, DEFAULT_INTERVAL, DEFAULT_LIMIT, WINDOW_COUNT};
pub use timer::{BlockTimer, CancellableTimer, SteppedTimer};
