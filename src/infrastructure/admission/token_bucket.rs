//! Token bucket
//!
//! Classic token bucket: a capacity of `burst` tokens refilled continuously
//! at `rate` tokens per second. Each admitted request consumes one token.
//! Time is passed in by the caller so the arithmetic stays deterministic
//! under test.

use std::time::{Duration, Instant};

use crate::domain::admission::RateDecision;

/// Per-key token bucket state
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Currently available tokens, in [0, burst]
    tokens: f64,
    /// When tokens were last refilled
    last_refill: Instant,
    /// When the bucket was last touched, for idle eviction
    last_seen: Instant,
}

impl TokenBucket {
    /// A fresh bucket starts full
    pub fn new(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            last_seen: now,
        }
    }

    /// Refill for the elapsed time, then try to consume one token
    pub fn try_consume(&mut self, rate: f64, burst: u32, now: Instant) -> RateDecision {
        self.refill(rate, burst, now);
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::allowed()
        } else {
            let missing = 1.0 - self.tokens;
            let wait_secs = if rate > 0.0 {
                (missing / rate).ceil() as u64
            } else {
                u64::MAX
            };
            RateDecision::rejected(wait_secs)
        }
    }

    /// How long the bucket has been idle
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    fn refill(&mut self, rate: f64, burst: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed > Duration::ZERO {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(f64::from(burst));
            self.last_refill = now;
        }
    }

    #[cfg(test)]
    pub fn available(&self) -> f64 {
        self.tokens
    }
}
