//! Throttles writes to a slow downstream sink with a windowed token bucket.
//!
//! Run with `RUST_LOG` unset; refill events are printed at debug level.
use std::thread;
use std::time::{Duration, Instant};
use windowed_bucket::{BucketConfig, Decision, RateLimiter, TokenBucket};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).without_time().init();

    // 120 records per 1.2s interval: 20 per 200ms window, at most 240 banked.
    let config = BucketConfig::builder()
        .tokens_per_interval(120)
        .limit(2)
        .interval(Duration::from_millis(1200))
        .build()?;
    let bucket = TokenBucket::from_config(config);
    let refill = bucket.spawn()?;

    let started = Instant::now();
    let mut written = 0u64;
    let mut denied = 0u64;
    while started.elapsed() < Duration::from_secs(2) {
        match bucket.acquire(5) {
            Decision::Allowed { remaining } => {
                written += 5;
                if remaining == 0 {
                    println!("drained after {written} records");
                }
            }
            Decision::Denied { wait, reason } => {
                denied += 1;
                thread::sleep(wait.min(Duration::from_millis(50)));
                if denied % 10 == 0 {
                    println!("held back ({reason}), {written} written so far");
                }
            }
        }
    }

    refill.shutdown().map_err(|_| "refill thread panicked")?;
    println!("wrote {written} records in {:?}, {denied} denials", started.elapsed());
    Ok(())
}
