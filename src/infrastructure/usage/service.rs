//! Usage tracking service
//!
//! Write-and-forget audit recording. A failed write is logged and dropped:
//! the admission decision has already been made and audit completeness does
//! not outrank availability.

use std::sync::Arc;

use tracing::warn;

use crate::domain::usage::{UsageRecord, UsageRepository, UsageStats};
use crate::domain::DomainError;

/// Records usage rows and serves per-key statistics
#[derive(Debug)]
pub struct UsageTrackingService {
    repository: Arc<dyn UsageRepository>,
}

impl UsageTrackingService {
    pub fn new(repository: Arc<dyn UsageRepository>) -> Self {
        Self { repository }
    }

    /// Append a usage row. Never fails the caller.
    pub async fn record(&self, record: UsageRecord) {
        if let Err(e) = self.repository.record(record).await {
            warn!(error = %e, "failed to record API key usage");
        }
    }

    /// Aggregate statistics for one key
    pub async fn stats_for_key(&self, api_key_id: &str) -> Result<UsageStats, DomainError> {
        self.repository.stats_for_key(api_key_id).await
    }
}
