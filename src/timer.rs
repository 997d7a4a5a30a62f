//! Cancellable blocking waits
//!
//! The refill loop paces itself with a [`BlockTimer`]. Production code uses
//! [`CancellableTimer`]; tests swap in [`SteppedTimer`] so every refill window
//! can be released by hand without real delays.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A blocking wait that can be cut short, permanently, from another thread.
pub trait BlockTimer: Send + Sync + std::fmt::Debug {
    /// Park the calling thread for up to `duration`, or until [`finish`](Self::finish).
    ///
    /// Returns `true` once the timer is finished (before or during the wait) and
    /// `false` when the full duration elapsed. Returns immediately if already finished.
    fn block(&self, duration: Duration) -> bool;

    /// Mark the timer finished and wake every blocked caller. Idempotent.
    fn finish(&self);

    /// Whether [`finish`](Self::finish) has been called.
    fn is_finished(&self) -> bool;
}

/// Monitor-based timer: a `Mutex<bool>` guarded by a `Condvar`.
///
/// The flag is only read and written under the lock, so a `finish` racing with
/// a `block` is either seen before the wait starts or wakes it.
#[derive(Debug, Default)]
pub struct CancellableTimer {
    finished: Mutex<bool>,
    cond: Condvar,
}

impl CancellableTimer {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a valid bool.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockTimer for CancellableTimer {
    fn block(&self, duration: Duration) -> bool {
        let guard = self.lock();
        if *guard {
            return true;
        }
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, duration, |finished| !*finished)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn finish(&self) {
        let mut guard = self.lock();
        *guard = true;
        self.cond.notify_all();
    }

    fn is_finished(&self) -> bool {
        *self.lock()
    }
}

#[derive(Debug, Default)]
struct SteppedState {
    finished: bool,
    generation: u64,
    parked_at: Option<u64>,
    calls: Vec<Duration>,
}

/// Test timer that only returns from `block` when ticked or finished.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// bucket. Requested durations are recorded but never slept.
#[derive(Debug, Clone, Default)]
pub struct SteppedTimer {
    inner: Arc<(Mutex<SteppedState>, Condvar)>,
}

impl SteppedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SteppedState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the current `block` call as if its duration had elapsed.
    pub fn tick(&self) {
        let mut state = self.lock();
        state.generation += 1;
        self.inner.1.notify_all();
    }

    /// Wait until a caller is parked in `block` for the current tick, or the timer is finished.
    pub fn wait_blocked(&self) {
        let state = self.lock();
        let _state = self
            .inner
            .1
            .wait_while(state, |s| !s.finished && s.parked_at != Some(s.generation))
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`wait_blocked`](Self::wait_blocked) with an upper bound.
    ///
    /// Returns `true` if a caller is parked (or the timer finished) before `timeout`.
    pub fn wait_blocked_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (_state, result) = self
            .inner
            .1
            .wait_timeout_while(state, timeout, |s| {
                !s.finished && s.parked_at != Some(s.generation)
            })
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    /// Durations requested so far, in call order.
    pub fn calls(&self) -> Vec<Duration> {
        self.lock().calls.clone()
    }
}

impl BlockTimer for SteppedTimer {
    fn block(&self, duration: Duration) -> bool {
        let mut state = self.lock();
        state.calls.push(duration);
        if state.finished {
            return true;
        }
        let generation = state.generation;
        state.parked_at = Some(generation);
        self.inner.1.notify_all();

        let mut state = self
            .inner
            .1
            .wait_while(state, |s| !s.finished && s.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        state.parked_at = None;
        state.finished
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        self.inner.1.notify_all();
    }

    fn is_finished(&self) -> bool {
        self.lock().finished
    }
}
