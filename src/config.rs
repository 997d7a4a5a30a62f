//! Validated bucket configuration

use crate::error::BucketError;
use crate::schedule::{DEFAULT_INTERVAL, DEFAULT_LIMIT, WINDOW_COUNT};
use std::time::Duration;

/// Validated configuration for a [`TokenBucket`](crate::TokenBucket).
///
/// The capacity ceiling is `limit * tokens_per_interval`; the interval is split
/// into [`WINDOW_COUNT`] refill windows.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBucketConfig", into = "RawBucketConfig")
)]
pub struct BucketConfig {
    tokens_per_interval: u64,
    limit: u64,
    interval: Duration,
}

impl BucketConfig {
    /// Create a config with the default limit (10) and interval (60s).
    ///
    /// # Examples
    /// ```
    /// use windowed_bucket::BucketConfig;
    /// let cfg = BucketConfig::new(10).unwrap();
    /// assert_eq!(cfg.max_tokens(), 100);
    /// ```
    pub fn new(tokens_per_interval: u64) -> Result<Self, BucketError> {
        Self::builder().tokens_per_interval(tokens_per_interval).build()
    }

    pub fn builder() -> BucketConfigBuilder {
        BucketConfigBuilder::new()
    }

    /// Tokens granted per interval.
    pub fn tokens_per_interval(&self) -> u64 {
        self.tokens_per_interval
    }

    /// Capacity multiplier.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of one full replenishment cycle.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Length of one refill window (`interval / 6`).
    pub fn window(&self) -> Duration {
        self.interval / WINDOW_COUNT as u32
    }

    /// Capacity ceiling; tokens beyond it are discarded.
    pub fn max_tokens(&self) -> u64 {
        // Checked in validate().
        self.limit.saturating_mul(self.tokens_per_interval)
    }

    /// Smallest interval that still yields a non-zero window.
    pub fn min_interval() -> Duration {
        Duration::from_nanos(WINDOW_COUNT as u64)
    }

    /// Check every field; builders and deserialization call this.
    pub fn validate(&self) -> Result<(), BucketError> {
        if self.tokens_per_interval == 0 {
            return Err(BucketError::InvalidRate { provided: 0 });
        }
        if self.limit == 0 {
            return Err(BucketError::InvalidLimit { provided: 0 });
        }
        if self.limit.checked_mul(self.tokens_per_interval).is_none() {
            return Err(BucketError::CapacityOverflow {
                limit: self.limit,
                tokens_per_interval: self.tokens_per_interval,
            });
        }
        if self.interval < Self::min_interval() {
            return Err(BucketError::InvalidInterval {
                provided: self.interval,
                min: Self::min_interval(),
            });
        }
        Ok(())
    }
}

/// Builder for [`BucketConfig`].
#[derive(Debug, Clone)]
pub struct BucketConfigBuilder {
    tokens_per_interval: u64,
    limit: u64,
    interval: Duration,
}

impl BucketConfigBuilder {
    /// Create a builder with the default limit and interval. The rate must be set.
    pub fn new() -> Self {
        Self { tokens_per_interval: 0, limit: DEFAULT_LIMIT, interval: DEFAULT_INTERVAL }
    }

    /// Set tokens granted per interval. Must be > 0.
    pub fn tokens_per_interval(mut self, tokens: u64) -> Self {
        self.tokens_per_interval = tokens;
        self
    }

    /// Set the capacity multiplier. Must be > 0.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Override the replenishment interval (default 60s).
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Build the config, validating inputs.
    pub fn build(self) -> Result<BucketConfig, BucketError> {
        let cfg = BucketConfig {
            tokens_per_interval: self.tokens_per_interval,
            limit: self.limit,
            interval: self.interval,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Default for BucketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawBucketConfig {
    tokens_per_interval: u64,
    #[serde(default = "default_limit")]
    limit: u64,
    #[serde(default = "default_interval")]
    interval: Duration,
}

#[cfg(feature = "serde")]
fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

#[cfg(feature = "serde")]
fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

#[cfg(feature = "serde")]
impl TryFrom<RawBucketConfig> for BucketConfig {
    type Error = BucketError;

    fn try_from(raw: RawBucketConfig) -> Result<Self, Self::Error> {
        BucketConfig::builder()
            .tokens_per_interval(raw.tokens_per_interval)
            .limit(raw.limit)
            .interval(raw.interval)
            .build()
    }
}

#[cfg(feature = "serde")]
impl From<BucketConfig> for RawBucketConfig {
    fn from(cfg: BucketConfig) -> Self {
        Self {
            tokens_per_interval: cfg.tokens_per_interval,
            limit: cfg.limit,
            interval: cfg.interval,
        }
    }
}
