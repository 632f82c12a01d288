//! Sharded per-key rate limiter
//!
//! Buckets live in an N-way sharded map so unrelated keys never contend on
//! one lock. Critical sections are a map lookup plus token arithmetic; the
//! locks are plain mutexes and are never held across an await point.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::admission::RateDecision;

use super::token_bucket::TokenBucket;

const SHARD_COUNT: usize = 16;

/// Rate and burst for one limiter
#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    /// Sustained tokens per second
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
        }
    }
}

/// Sharded keyed token-bucket limiter
#[derive(Debug)]
pub struct ShardedRateLimiter {
    shards: Vec<Mutex<HashMap<String, TokenBucket>>>,
    config: RateConfig,
}

impl ShardedRateLimiter {
    pub fn new(config: RateConfig) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();

        Self { shards, config }
    }

    pub fn config(&self) -> RateConfig {
        self.config
    }

    /// Check-and-consume for the given key
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Check-and-consume at an explicit instant (deterministic tests)
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut shard = self.lock_shard(key);

        let bucket = shard
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.burst, now));

        bucket.try_consume(self.config.requests_per_second, self.config.burst, now)
    }

    /// Drop state for one key
    pub fn reset(&self, key: &str) {
        let mut shard = self.lock_shard(key);
        shard.remove(key);
    }

    /// Evict buckets idle past the TTL; returns how many were removed
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        self.sweep_idle_at(ttl, Instant::now())
    }

    pub fn sweep_idle_at(&self, ttl: Duration, now: Instant) -> usize {
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            let before = shard.len();
            shard.retain(|_, bucket| bucket.idle_for(now) <= ttl);
            removed += before - shard.len();
        }

        removed
    }

    /// Number of keys currently tracked across all shards
    pub fn tracked_keys(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    fn lock_shard(&self, key: &str) -> std::sync::MutexGuard<'_, HashMap<String, TokenBucket>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % SHARD_COUNT;

        // Token arithmetic cannot panic while the lock is held, so a
        // poisoned shard still carries consistent state.
        self.shards[index].lock().unwrap_or_else(|e| e.into_inner())
    }
}
