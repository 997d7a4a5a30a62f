//! Diagnostic events emitted by the refill loop.
//!
//! A [`TokenBucket`](crate::TokenBucket) reports its lifecycle and every
//! window application to a [`BucketSink`]. Sinks only observe: nothing they do
//! feeds back into the bucket.
//!
//! ```rust
//! use windowed_bucket::events::{BucketEvent, BucketSink, MemorySink};
//!
//! let sink = MemorySink::new();
//! sink.emit(&BucketEvent::Started);
//! sink.emit(&BucketEvent::Refilled { window: 0, added: 2, available: 2 });
//! assert_eq!(sink.len(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Events emitted while the refill loop runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketEvent {
    /// The refill loop entered `start`.
    Started,
    /// A window's share was applied.
    Refilled {
        /// Window index within the interval (0..6).
        window: usize,
        /// Tokens actually added after clamping to the ceiling.
        added: u64,
        /// Tokens available after the refill.
        available: u64,
    },
    /// The refill loop observed cancellation and returned.
    Finished,
}

impl fmt::Display for BucketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketEvent::Started => write!(f, "bucket started"),
            BucketEvent::Refilled { added, available, .. } => {
                write!(f, "added token: {}, total token {}", added, available)
            }
            BucketEvent::Finished => write!(f, "bucket finished"),
        }
    }
}

/// Consumer of [`BucketEvent`]s. Called from the refill thread, so keep it cheap.
pub trait BucketSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: &BucketEvent);
}

/// A sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl BucketSink for NullSink {
    fn emit(&self, _event: &BucketEvent) {}
}

/// A sink that logs events at `debug` through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl BucketSink for LogSink {
    fn emit(&self, event: &BucketEvent) {
        match event {
            BucketEvent::Refilled { window, added, available } => {
                tracing::debug!(
                    target: "windowed_bucket",
                    window,
                    added,
                    available,
                    "{}",
                    event
                );
            }
            _ => tracing::debug!(target: "windowed_bucket", "{}", event),
        }
    }
}

/// A sink that stores events in memory, evicting the oldest past `capacity`.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<BucketEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BucketEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<BucketEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketSink for MemorySink {
    fn emit(&self, event: &BucketEvent) {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn display_matches_log_lines() {
        assert_eq!(BucketEvent::Started.to_string(), "bucket started");
        assert_eq!(BucketEvent::Finished.to_string(), "bucket finished");
        let refill = BucketEvent::Refilled { window: 3, added: 2, available: 8 };
        assert_eq!(refill.to_string(), "added token: 2, total token 8");
    }

    #[test]
    fn memory_sink_evicts_oldest() {
        let sink = MemorySink::with_capacity(2);
        sink.emit(&BucketEvent::Started);
        sink.emit(&BucketEvent::Refilled { window: 0, added: 1, available: 1 });
        sink.emit(&BucketEvent::Finished);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events()[1], BucketEvent::Finished);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn memory_sink_capacity_is_at_least_one() {
        let sink = MemorySink::with_capacity(0);
        assert_eq!(sink.capacity(), 1);
        sink.emit(&BucketEvent::Started);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn log_sink_writes_debug_lines() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        LogSink.emit(&BucketEvent::Started);
        LogSink.emit(&BucketEvent::Refilled { window: 0, added: 2, available: 2 });

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("bucket started"));
        assert!(logs.contains("added token: 2, total token 2"));
        assert!(logs.contains("windowed_bucket"));
    }
}
