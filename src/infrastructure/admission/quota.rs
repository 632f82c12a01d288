//! Monthly quota tracking
//!
//! Counters keyed by (identity, `YYYY-MM`). The decision and the increment
//! happen under a single shard lock, so for a given identity the quota check
//! is linearizable: with one slot left, exactly one concurrent request wins.
//! State ages out naturally as the month key rolls over; a low-priority
//! sweep drops past-month entries.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::domain::admission::QuotaDecision;
use crate::domain::identity::Plan;

const SHARD_COUNT: usize = 16;

/// Sharded monthly counters
#[derive(Debug)]
pub struct MonthlyQuota {
    shards: Vec<Mutex<HashMap<(String, String), u32>>>,
}

impl MonthlyQuota {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();

        Self { shards }
    }

    /// Atomically check the identity's count for the current month against
    /// the limit and consume one slot when admitted. Never increments on a
    /// rejection.
    pub fn check_and_increment(
        &self,
        identity_key: &str,
        limit: u32,
        plan: Plan,
    ) -> QuotaDecision {
        self.check_and_increment_at(identity_key, limit, plan, Utc::now())
    }

    /// Check-and-increment at an explicit timestamp (deterministic tests)
    pub fn check_and_increment_at(
        &self,
        identity_key: &str,
        limit: u32,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let month = month_key(now);
        let resets = next_month_reset(now);

        let mut shard = self.lock_shard(identity_key);
        let entry = shard
            .entry((identity_key.to_string(), month))
            .or_insert(0);

        if *entry >= limit {
            QuotaDecision {
                allowed: false,
                used: *entry,
                limit,
                plan,
                resets,
            }
        } else {
            *entry += 1;
            QuotaDecision {
                allowed: true,
                used: *entry,
                limit,
                plan,
                resets,
            }
        }
    }

    /// Current count for an identity in the given month
    pub fn used(&self, identity_key: &str, now: DateTime<Utc>) -> u32 {
        let month = month_key(now);
        let shard = self.lock_shard(identity_key);
        shard
            .get(&(identity_key.to_string(), month))
            .copied()
            .unwrap_or(0)
    }

    /// Drop counters for months before the current one; returns how many
    /// entries were removed.
    pub fn sweep_past_months(&self, now: DateTime<Utc>) -> usize {
        let current = month_key(now);
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            let before = shard.len();
            shard.retain(|(_, month), _| *month == current);
            removed += before - shard.len();
        }

        removed
    }

    /// Number of tracked (identity, month) entries
    pub fn tracked_entries(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    fn lock_shard(
        &self,
        identity_key: &str,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, String), u32>> {
        let mut hasher = DefaultHasher::new();
        identity_key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % SHARD_COUNT;

        self.shards[index].lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MonthlyQuota {
    fn default() -> Self {
        Self::new()
    }
}

fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Start of the next month in UTC
pub fn next_month_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    // The first of a month always exists
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}
