//! In-memory usage repository

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::usage::{UsageRecord, UsageRepository, UsageStats};
use crate::domain::DomainError;

/// In-memory implementation of [`UsageRepository`]
#[derive(Debug, Default)]
pub struct InMemoryUsageRepository {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn stats_for_key(&self, api_key_id: &str) -> Result<UsageStats, DomainError> {
        let records = self.records.read().await;

        let for_key: Vec<UsageRecord> = records
            .iter()
            .filter(|r| r.api_key_id == api_key_id)
            .cloned()
            .collect();

        Ok(UsageStats::from_records(&for_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_stats() {
        let repo = InMemoryUsageRepository::new();

        repo.record(UsageRecord::new("key-1", "/api/v1/recipes", "GET", 200))
            .await
            .unwrap();
        repo.record(UsageRecord::new("key-1", "/api/v1/recipes", "GET", 200))
            .await
            .unwrap();
        repo.record(UsageRecord::new("key-2", "/api/v1/meals", "POST", 201))
            .await
            .unwrap();

        let stats = repo.stats_for_key("key-1").await.unwrap();
        assert_eq!(stats.total_requests, 2);

        let stats = repo.stats_for_key("key-2").await.unwrap();
        assert_eq!(stats.total_requests, 1);

        let stats = repo.stats_for_key("key-3").await.unwrap();
        assert_eq!(stats.total_requests, 0);
    }
}
