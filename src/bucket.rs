//! Token bucket with a windowed background refill
//!
//! A [`TokenBucket`] holds a token counter capped at
//! `limit * tokens_per_interval`. [`TokenBucket::start`] runs the refill loop:
//! it applies one [`WindowSchedule`] share, then waits one window on the
//! bucket's [`BlockTimer`], forever, until [`TokenBucket::stop`] finishes the
//! timer. Other threads drain tokens with [`TokenBucket::consume`] and check
//! [`TokenBucket::is_exhausted`] before doing throttled work.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start/spawn--> Running --stop--> Stopped
//!   \-------------------stop------------------^
//! ```
//!
//! Accessors are valid in every state. `start` while `Running` returns
//! [`BucketError::AlreadyRunning`]; `start` once `Stopped` returns
//! [`BucketError::Stopped`] without applying any window.

use crate::config::BucketConfig;
use crate::error::BucketError;
use crate::events::{BucketEvent, BucketSink, LogSink};
use crate::schedule::WindowSchedule;
use crate::timer::{BlockTimer, CancellableTimer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Lifecycle state of the refill loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// Constructed, refill loop not started yet. Tokens stay at 0.
    Idle,
    /// Refill loop is applying windows.
    Running,
    /// `stop` was called; the bucket never refills again.
    Stopped,
}

impl BucketState {
    fn from_u8(v: u8) -> Self {
        match v {
            STATE_IDLE => BucketState::Idle,
            STATE_RUNNING => BucketState::Running,
            _ => BucketState::Stopped,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub(crate) tokens: u64,
    pub(crate) last_refill: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    ledger: Mutex<Ledger>,
    state: AtomicU8,
    timer: Arc<dyn BlockTimer>,
    sink: Arc<dyn BucketSink>,
}

/// Bounded token bucket refilled in six windows per interval.
///
/// Clones share the same counter, timer, sink and lifecycle via `Arc`, so one
/// clone can run [`start`](Self::start) on a dedicated thread while others
/// consume, and `stop` on any clone ends the loop. The timer and sink can only
/// be replaced while no clone exists.
///
/// # Examples
/// ```
/// use windowed_bucket::TokenBucket;
///
/// let bucket = TokenBucket::new(10).unwrap();
/// assert!(bucket.is_exhausted());
///
/// let refill = bucket.spawn().unwrap();
/// // first window lands right away
/// # while bucket.available() == 0 { std::thread::yield_now(); }
/// assert_eq!(bucket.available(), 2);
/// bucket.consume(1);
/// assert_eq!(bucket.available(), 1);
/// refill.shutdown().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    shared: Arc<Shared>,
    config: BucketConfig,
    schedule: WindowSchedule,
}

impl TokenBucket {
    /// Bucket granting `tokens_per_interval` per minute, capped at ten minutes' worth.
    pub fn new(tokens_per_interval: u64) -> Result<Self, BucketError> {
        Ok(Self::from_config(BucketConfig::new(tokens_per_interval)?))
    }

    /// Bucket with an explicit capacity multiplier (`max_tokens = limit * tokens_per_interval`).
    pub fn with_limit(tokens_per_interval: u64, limit: u64) -> Result<Self, BucketError> {
        let config = BucketConfig::builder()
            .tokens_per_interval(tokens_per_interval)
            .limit(limit)
            .build()?;
        Ok(Self::from_config(config))
    }

    /// Bucket from an already validated config.
    pub fn from_config(config: BucketConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(Ledger::default()),
                state: AtomicU8::new(STATE_IDLE),
                timer: Arc::new(CancellableTimer::new()),
                sink: Arc::new(LogSink),
            }),
            schedule: WindowSchedule::new(config.tokens_per_interval()),
            config,
        }
    }

    /// Override the pacing timer (useful for deterministic tests).
    ///
    /// # Errors
    /// [`BucketError::Shared`] if a clone of this bucket exists; every clone
    /// must pace and stop through the same timer.
    ///
    /// # Example
    /// ```
    /// use windowed_bucket::{SteppedTimer, TokenBucket};
    /// let timer = SteppedTimer::new();
    /// let bucket = TokenBucket::new(10).unwrap().with_timer(timer.clone()).unwrap();
    /// assert!(bucket.clone().with_timer(timer).is_err());
    /// ```
    pub fn with_timer<T: BlockTimer + 'static>(mut self, timer: T) -> Result<Self, BucketError> {
        self.shared_mut()?.timer = Arc::new(timer);
        Ok(self)
    }

    /// Override where diagnostic events go (default: [`LogSink`]).
    ///
    /// # Errors
    /// [`BucketError::Shared`] if a clone of this bucket exists.
    pub fn with_sink<S: BucketSink + 'static>(mut self, sink: S) -> Result<Self, BucketError> {
        self.shared_mut()?.sink = Arc::new(sink);
        Ok(self)
    }

    fn shared_mut(&mut self) -> Result<&mut Shared, BucketError> {
        Arc::get_mut(&mut self.shared).ok_or(BucketError::Shared)
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    pub fn schedule(&self) -> &WindowSchedule {
        &self.schedule
    }

    pub fn tokens_per_interval(&self) -> u64 {
        self.config.tokens_per_interval()
    }

    /// Capacity ceiling.
    pub fn max_tokens(&self) -> u64 {
        self.config.max_tokens()
    }

    pub fn state(&self) -> BucketState {
        BucketState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == BucketState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == BucketState::Stopped
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Ledger> {
        // Every critical section is a single assignment, so a poisoned ledger is still consistent.
        self.shared.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report consumption of `amount` tokens.
    ///
    /// Available tokens drop by `amount`, floored at 0. Over-consumption is
    /// clamped silently; an already empty bucket is left untouched.
    #[doc(alias = "add")]
    pub fn consume(&self, amount: u64) {
        let mut ledger = self.lock();
        if ledger.tokens == 0 {
            return;
        }
        ledger.tokens = ledger.tokens.saturating_sub(amount);
    }

    /// `true` when no tokens remain to spend.
    #[doc(alias = "full")]
    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }

    /// Tokens currently available.
    #[doc(alias = "capacity")]
    pub fn available(&self) -> u64 {
        self.lock().tokens
    }

    /// Run the refill loop on the calling thread until [`stop`](Self::stop).
    ///
    /// The first window is applied immediately; each later one after a window's
    /// wait. Returns `Ok(())` once stopped.
    ///
    /// # Errors
    /// [`BucketError::AlreadyRunning`] if another `start` is in progress,
    /// [`BucketError::Stopped`] if the bucket was stopped before starting.
    pub fn start(&self) -> Result<(), BucketError> {
        self.enter_running()?;
        self.run_refill_loop();
        Ok(())
    }

    /// Signal the refill loop to finish. Idempotent, never blocks.
    ///
    /// A bucket stopped before it started can no longer be started.
    pub fn stop(&self) {
        let _ = self.shared.state.compare_exchange(
            STATE_IDLE,
            STATE_STOPPED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.shared.timer.finish();
    }

    /// Run the refill loop on a dedicated, named thread.
    ///
    /// The lifecycle transition happens on the calling thread, so misuse is
    /// reported here rather than inside the worker.
    pub fn spawn(&self) -> Result<RefillHandle, BucketError> {
        self.enter_running()?;
        let bucket = self.clone();
        let spawned = thread::Builder::new()
            .name("windowed-bucket-refill".into())
            .spawn(move || bucket.run_refill_loop());
        match spawned {
            Ok(thread) => Ok(RefillHandle { bucket: self.clone(), thread: Some(thread) }),
            Err(e) => {
                self.shared.state.store(STATE_IDLE, Ordering::Release);
                Err(BucketError::Spawn { reason: e.to_string() })
            }
        }
    }

    /// Run the refill loop on the current tokio runtime's blocking pool.
    ///
    /// # Errors
    /// [`BucketError::Spawn`] when called outside a tokio runtime, plus the
    /// lifecycle errors of [`start`](Self::start).
    pub fn spawn_blocking(&self) -> Result<tokio::task::JoinHandle<()>, BucketError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BucketError::Spawn { reason: e.to_string() })?;
        self.enter_running()?;
        let bucket = self.clone();
        Ok(handle.spawn_blocking(move || bucket.run_refill_loop()))
    }

    fn enter_running(&self) -> Result<(), BucketError> {
        match self.shared.state.compare_exchange(
            STATE_IDLE,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_RUNNING) => return Err(BucketError::AlreadyRunning),
            Err(_) => return Err(BucketError::Stopped),
        }
        // An injected timer may already be finished.
        if self.shared.timer.is_finished() {
            self.shared.state.store(STATE_STOPPED, Ordering::Release);
            return Err(BucketError::Stopped);
        }
        Ok(())
    }

    // Caller must have moved the state to Running.
    fn run_refill_loop(&self) {
        struct StopGuard<'a>(&'a Shared);
        impl Drop for StopGuard<'_> {
            fn drop(&mut self) {
                self.0.state.store(STATE_STOPPED, Ordering::Release);
            }
        }
        let _guard = StopGuard(&self.shared);

        self.shared.sink.emit(&BucketEvent::Started);
        let window = self.config.window();
        for (index, share) in self.schedule.cycle() {
            let (added, available) = self.refill(share);
            self.shared.sink.emit(&BucketEvent::Refilled { window: index, added, available });

            if self.shared.timer.block(window) {
                break;
            }
        }
        self.shared.sink.emit(&BucketEvent::Finished);
    }

    /// Apply one window share, clamped to the ceiling. Returns `(added, available)`.
    fn refill(&self, share: u64) -> (u64, u64) {
        let max = self.max_tokens();
        let mut ledger = self.lock();
        let before = ledger.tokens;
        ledger.tokens = before.saturating_add(share).min(max);
        ledger.last_refill = Some(Instant::now());
        (ledger.tokens - before, ledger.tokens)
    }

    /// Time until the next window lands, given the ledger's last refill.
    pub(crate) fn next_refill_in(&self, ledger: &Ledger) -> Duration {
        let window = self.config.window();
        ledger.last_refill.map_or(window, |at| window.saturating_sub(at.elapsed()))
    }
}

/// Owner of a refill thread started by [`TokenBucket::spawn`].
///
/// Dropping the handle stops the loop and joins the thread.
#[derive(Debug)]
#[must_use = "dropping the handle stops the refill loop"]
pub struct RefillHandle {
    bucket: TokenBucket,
    thread: Option<JoinHandle<()>>,
}

impl RefillHandle {
    /// The bucket this worker refills.
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    /// Signal the worker to finish without waiting for it.
    pub fn stop(&self) {
        self.bucket.stop();
    }

    /// Whether the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => true,
        }
    }

    /// Wait for the worker to return. Call [`stop`](Self::stop) first or this blocks forever.
    pub fn join(mut self) -> thread::Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }

    /// Stop the worker and wait for it.
    pub fn shutdown(self) -> thread::Result<()> {
        self.stop();
        self.join()
    }
}

impl Drop for RefillHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.bucket.stop();
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemorySink, NullSink};
    use crate::timer::SteppedTimer;

    fn stepped(tokens_per_interval: u64, limit: u64) -> (TokenBucket, SteppedTimer) {
        let timer = SteppedTimer::new();
        let bucket = TokenBucket::with_limit(tokens_per_interval, limit)
            .unwrap()
            .with_timer(timer.clone())
            .unwrap()
            .with_sink(NullSink)
            .unwrap();
        (bucket, timer)
    }

    fn parked(timer: &SteppedTimer) {
        assert!(timer.wait_blocked_timeout(Duration::from_secs(5)), "refill loop never parked");
    }

    #[test]
    fn fresh_bucket_is_exhausted_and_idle() {
        let bucket = TokenBucket::new(10).unwrap();
        assert!(bucket.is_exhausted());
        assert_eq!(bucket.available(), 0);
        assert_eq!(bucket.max_tokens(), 100);
        assert_eq!(bucket.state(), BucketState::Idle);
    }

    #[test]
    fn consume_on_empty_bucket_is_noop() {
        let bucket = TokenBucket::new(10).unwrap();
        bucket.consume(5);
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn refill_clamps_to_ceiling() {
        let bucket = TokenBucket::with_limit(10, 1).unwrap();
        assert_eq!(bucket.refill(7), (7, 7));
        assert_eq!(bucket.refill(7), (3, 10));
        assert_eq!(bucket.refill(7), (0, 10));
    }

    #[test]
    fn consume_floors_at_zero() {
        let bucket = TokenBucket::new(10).unwrap();
        bucket.refill(5);
        bucket.consume(2);
        assert_eq!(bucket.available(), 3);
        bucket.consume(1000);
        assert_eq!(bucket.available(), 0);
        assert!(bucket.is_exhausted());
    }

    #[test]
    fn start_twice_is_rejected() {
        let (bucket, timer) = stepped(10, 10);
        let handle = bucket.spawn().unwrap();
        parked(&timer);

        assert_eq!(bucket.start(), Err(BucketError::AlreadyRunning));
        assert!(matches!(bucket.spawn(), Err(BucketError::AlreadyRunning)));

        handle.shutdown().unwrap();
        assert!(bucket.is_stopped());
    }

    #[test]
    fn stop_before_start_prevents_start() {
        let (bucket, timer) = stepped(10, 10);
        bucket.stop();
        bucket.stop();
        assert!(bucket.is_stopped());
        assert_eq!(bucket.start(), Err(BucketError::Stopped));
        assert_eq!(bucket.available(), 0);
        assert!(timer.calls().is_empty());
    }

    #[test]
    fn finished_timer_counts_as_stopped() {
        let (bucket, timer) = stepped(10, 10);
        timer.finish();
        assert_eq!(bucket.start(), Err(BucketError::Stopped));
        assert_eq!(bucket.state(), BucketState::Stopped);
    }

    #[test]
    fn loop_waits_one_window_per_share() {
        let (bucket, timer) = stepped(10, 10);
        let handle = bucket.spawn().unwrap();
        parked(&timer);
        timer.tick();
        parked(&timer);
        handle.shutdown().unwrap();

        assert_eq!(timer.calls(), vec![Duration::from_secs(10); 2]);
    }

    #[test]
    fn loop_emits_lifecycle_events() {
        let timer = SteppedTimer::new();
        let sink = MemorySink::new();
        let bucket = TokenBucket::new(10)
            .unwrap()
            .with_timer(timer.clone())
            .unwrap()
            .with_sink(sink.clone())
            .unwrap();

        let handle = bucket.spawn().unwrap();
        parked(&timer);
        handle.shutdown().unwrap();

        assert_eq!(
            sink.events(),
            vec![
                BucketEvent::Started,
                BucketEvent::Refilled { window: 0, added: 2, available: 2 },
                BucketEvent::Finished,
            ]
        );
    }

    #[test]
    fn timer_and_sink_are_fixed_once_cloned() {
        let bucket = TokenBucket::new(10).unwrap();
        let clone = bucket.clone();
        assert_eq!(clone.with_sink(NullSink).unwrap_err(), BucketError::Shared);
        let clone = bucket.clone();
        assert_eq!(clone.with_timer(SteppedTimer::new()).unwrap_err(), BucketError::Shared);

        // the last handle is exclusive again
        assert!(bucket.with_timer(SteppedTimer::new()).is_ok());
    }

    #[test]
    fn dropping_handle_stops_worker() {
        let (bucket, timer) = stepped(10, 10);
        let handle = bucket.spawn().unwrap();
        parked(&timer);
        drop(handle);
        assert!(bucket.is_stopped());
        assert!(timer.is_finished());
    }

    #[test]
    fn next_refill_defaults_to_full_window() {
        let bucket = TokenBucket::new(10).unwrap();
        let ledger = Ledger::default();
        assert_eq!(bucket.next_refill_in(&ledger), Duration::from_secs(10));
        bucket.refill(1);
        let wait = bucket.next_refill_in(&bucket.lock());
        assert!(wait <= Duration::from_secs(10));
    }
}
