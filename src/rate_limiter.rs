//! Token bucket gating calls to the explorer API.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CAPACITY: f64 = 5.0;
pub const DEFAULT_FILL_RATE: f64 = 1.0;
/// Slowest fill rate the settings layer accepts, in tokens per second
pub const MIN_FILL_RATE: f64 = 1e-6;

/// A token bucket shared by every fetch of a trace.
///
/// The bucket starts full. Refill, check and deduct happen under one lock, so concurrent callers
/// can never be admitted past the bucket's capacity.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    fill_rate: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, capacity: f64, fill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + fill_rate * elapsed).min(capacity);
        self.last_refill = now;
    }
}

impl RateLimiter {
    /// `capacity` and `fill_rate` must both be positive; the settings layer validates them.
    pub fn new(capacity: f64, fill_rate: f64) -> Self {
        debug_assert!(capacity > 0.0 && fill_rate > 0.0);
        Self {
            capacity,
            fill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }

    /// Takes `n` tokens if they are available and returns zero. Otherwise takes nothing and
    /// returns how long the caller should wait before the bucket could hold `n` tokens.
    ///
    /// The returned wait is only a hint: other callers may drain the bucket in the meantime.
    pub fn try_acquire(&self, n: f64) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(self.capacity, self.fill_rate);
        if n <= bucket.tokens {
            bucket.tokens -= n;
            Duration::ZERO
        } else {
            // a vanishing fill rate means waiting forever, not a panic
            Duration::try_from_secs_f64((n - bucket.tokens) / self.fill_rate)
                .unwrap_or(Duration::MAX)
        }
    }

    /// Waits until `n` tokens have been taken from the bucket.
    ///
    /// Requests larger than the capacity are clamped to the capacity, they could never be granted
    /// otherwise.
    pub async fn acquire(&self, n: f64) {
        let n = n.min(self.capacity);
        loop {
            let wait = self.try_acquire(n);
            if wait.is_zero() {
                return;
            }
            debug!("Rate limited, waiting {:?} for {} token(s)", wait, n);
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently in the bucket, after refilling.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(self.capacity, self.fill_rate);
        bucket.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_FILL_RATE)
    }
}
