//! Refill window schedule
//!
//! Each interval is split into [`WINDOW_COUNT`] windows. The integer
//! `tokens_per_interval` is spread across them as evenly as possible: every
//! window gets `tokens_per_interval / 6`, and the first `tokens_per_interval % 6`
//! windows get one extra token.

use std::time::Duration;

/// Number of refill windows per interval.
pub const WINDOW_COUNT: usize = 6;

/// Default replenishment interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default multiplier applied to `tokens_per_interval` to get the capacity ceiling.
pub const DEFAULT_LIMIT: u64 = 10;

/// Per-window token shares for one interval, repeated every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSchedule {
    shares: [u64; WINDOW_COUNT],
}

impl WindowSchedule {
    /// Split `tokens_per_interval` across the windows.
    ///
    /// ```
    /// use windowed_bucket::WindowSchedule;
    /// assert_eq!(WindowSchedule::new(10).shares(), &[2, 2, 2, 2, 1, 1]);
    /// ```
    pub fn new(tokens_per_interval: u64) -> Self {
        let count = WINDOW_COUNT as u64;
        let base = tokens_per_interval / count;
        let extra = (tokens_per_interval % count) as usize;

        let mut shares = [base; WINDOW_COUNT];
        for share in shares.iter_mut().take(extra) {
            *share += 1;
        }
        Self { shares }
    }

    pub fn shares(&self) -> &[u64; WINDOW_COUNT] {
        &self.shares
    }

    /// Share of window `index`, or `None` past the last window.
    pub fn get(&self, index: usize) -> Option<u64> {
        self.shares.get(index).copied()
    }

    /// Tokens granted over one full interval.
    pub fn total(&self) -> u64 {
        self.shares.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.shares.iter().copied()
    }

    /// Endless `(window index, share)` sequence, one interval after another.
    pub fn cycle(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.shares.iter().copied().enumerate().cycle()
    }
}
