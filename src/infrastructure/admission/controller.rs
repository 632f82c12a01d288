//! Admission controller
//!
//! Owns the three gates and the background sweeper. Constructed once at
//! startup and injected through the application state; there is no global
//! mutable state.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::admission::{AdmissionError, QuotaDecision, RateScope};
use crate::domain::identity::{Identity, Plan};

use super::quota::MonthlyQuota;
use super::rate_limiter::{RateConfig, ShardedRateLimiter};

/// Bucket key used when the source address is unknown (e.g. a misbehaving
/// reverse proxy): the whole instance shares one bucket.
const INSTANCE_KEY: &str = "instance";

/// Configuration for the admission chain
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Gate A: per source IP
    pub ip_rate: RateConfig,
    /// Gate B: per resolved identity
    pub identity_rate: RateConfig,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// Rate state idle TTL before eviction
    pub idle_ttl: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            ip_rate: RateConfig {
                requests_per_second: 100.0,
                burst: 200,
            },
            identity_rate: RateConfig {
                requests_per_second: 10.0,
                burst: 20,
            },
            sweep_interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(3600),
        }
    }
}

/// The three admission gates, composed in a fixed order by the middleware
#[derive(Debug)]
pub struct AdmissionController {
    ip_limiter: ShardedRateLimiter,
    identity_limiter: ShardedRateLimiter,
    quota: MonthlyQuota,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            ip_limiter: ShardedRateLimiter::new(config.ip_rate),
            identity_limiter: ShardedRateLimiter::new(config.identity_rate),
            quota: MonthlyQuota::new(),
            config,
        }
    }

    /// Gate A: per source IP token bucket. Requests without a resolvable
    /// peer address share one per-instance bucket.
    pub fn check_ip(&self, ip: Option<IpAddr>) -> Result<(), AdmissionError> {
        let key = match ip {
            Some(ip) => ip.to_string(),
            None => INSTANCE_KEY.to_string(),
        };

        let decision = self.ip_limiter.check(&key);
        if decision.allowed {
            Ok(())
        } else {
            debug!(ip = %key, retry_after = decision.retry_after_secs, "IP rate limited");
            Err(AdmissionError::RateLimited {
                scope: RateScope::Ip,
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    /// Gate B: per-identity token bucket, independent of the IP gate so a
    /// caller rotating addresses is still bounded.
    pub fn check_identity(&self, identity: &Identity) -> Result<(), AdmissionError> {
        let decision = self.identity_limiter.check(&identity.as_key());
        if decision.allowed {
            Ok(())
        } else {
            debug!(
                identity = %identity,
                retry_after = decision.retry_after_secs,
                "identity rate limited"
            );
            Err(AdmissionError::RateLimited {
                scope: RateScope::Identity,
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    /// Gate C: monthly quota. Applied by the middleware to
    /// generation/mutation routes only. The check and the increment are a
    /// single critical section; a rejection consumes nothing.
    pub fn check_quota(
        &self,
        identity: &Identity,
        plan: Plan,
        shared_bonus: bool,
    ) -> Result<QuotaDecision, AdmissionError> {
        let limit = plan.monthly_limit(shared_bonus);
        let decision = self
            .quota
            .check_and_increment(&identity.as_key(), limit, plan);

        if decision.allowed {
            Ok(decision)
        } else {
            debug!(
                identity = %identity,
                used = decision.used,
                limit = decision.limit,
                plan = plan.as_str(),
                "monthly quota exceeded"
            );
            Err(AdmissionError::QuotaExceeded {
                used: decision.used,
                limit: decision.limit,
                plan: decision.plan,
                resets: decision.resets,
            })
        }
    }

    /// One sweep pass: evict idle rate state and stale quota months
    pub fn sweep_once(&self) -> (usize, usize) {
        let rate_evicted = self.identity_limiter.sweep_idle(self.config.idle_ttl)
            + self.ip_limiter.sweep_idle(self.config.idle_ttl);
        let quota_evicted = self.quota.sweep_past_months(Utc::now());

        (rate_evicted, quota_evicted)
    }

    /// Spawn the periodic sweeper. The task stops when the returned handle
    /// is dropped, tying its lifetime to server shutdown.
    pub fn start_sweeper(controller: Arc<AdmissionController>) -> SweeperHandle {
        let interval = controller.config.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let (rate_evicted, quota_evicted) = controller.sweep_once();
                if rate_evicted > 0 || quota_evicted > 0 {
                    info!(
                        rate_evicted,
                        quota_evicted,
                        "admission sweep evicted idle state"
                    );
                }
            }
        });

        SweeperHandle { handle }
    }

    /// Number of rate-state entries currently held (both limiters)
    pub fn tracked_rate_entries(&self) -> usize {
        self.ip_limiter.tracked_keys() + self.identity_limiter.tracked_keys()
    }

    #[cfg(test)]
    pub(crate) fn identity_limiter(&self) -> &ShardedRateLimiter {
        &self.identity_limiter
    }
}

/// Aborts the sweeper task on drop
#[derive(Debug)]
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
