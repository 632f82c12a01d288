//! Usage repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::record::{UsageRecord, UsageStats};
use crate::domain::DomainError;

/// Repository for append-only usage rows
#[async_trait]
pub trait UsageRepository: Send + Sync + Debug {
    /// Append a usage row
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError>;

    /// Aggregate statistics for one key
    async fn stats_for_key(&self, api_key_id: &str) -> Result<UsageStats, DomainError>;
}
