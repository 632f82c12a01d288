//! Admission infrastructure: token buckets, monthly quota, controller

mod controller;
mod quota;
mod rate_limiter;
mod token_bucket;

pub use controller::{AdmissionConfig, AdmissionController, SweeperHandle};
pub use quota::{next_month_reset, MonthlyQuota};
pub use rate_limiter::{RateConfig, ShardedRateLimiter};
pub use token_bucket::TokenBucket;
