//! In-memory API key repository
//!
//! Used by tests and local development. Mirrors the PostgreSQL repository's
//! observable behavior, including uniform misses on key lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyPage, ApiKeyRepository, ListApiKeysParams};
use crate::domain::DomainError;

use super::generator::constant_time_compare;

/// In-memory implementation of [`ApiKeyRepository`]
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<ApiKey>, DomainError> {
        let keys = self.keys.read().await;

        // Compare against every stored key so a miss costs the same
        // regardless of which (if any) entry matches.
        let mut found: Option<&ApiKey> = None;
        for candidate in keys.values() {
            if constant_time_compare(candidate.key(), key) {
                found = Some(candidate);
            }
        }

        Ok(found.cloned())
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;

        if keys.contains_key(api_key.id()) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                api_key.id()
            )));
        }

        if keys.values().any(|k| k.key() == api_key.key()) {
            return Err(DomainError::conflict(
                "API key value already exists",
            ));
        }

        keys.insert(api_key.id().to_string(), api_key.clone());
        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;

        if !keys.contains_key(api_key.id()) {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            )));
        }

        keys.insert(api_key.id().to_string(), api_key.clone());
        Ok(api_key.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        let mut keys = self.keys.write().await;
        Ok(keys.remove(id).is_some())
    }

    async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError> {
        let keys = self.keys.read().await;
        let (page, limit) = params.normalized();

        let mut matching: Vec<ApiKey> = keys
            .values()
            .filter(|k| {
                if let Some(search) = &params.search {
                    let needle = search.to_ascii_lowercase();
                    let in_name = k.name().to_ascii_lowercase().contains(&needle);
                    let in_description = k
                        .description()
                        .map(|d| d.to_ascii_lowercase().contains(&needle))
                        .unwrap_or(false);
                    if !in_name && !in_description {
                        return false;
                    }
                }

                if let Some(is_active) = params.is_active {
                    if k.is_active() != is_active {
                        return false;
                    }
                }

                if let Some(user_id) = &params.user_id {
                    if k.user_id() != Some(user_id.as_str()) {
                        return false;
                    }
                }

                true
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = matching.len() as i64;
        let offset = ((page - 1) * limit) as usize;
        let api_keys: Vec<ApiKey> = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(ApiKeyPage { api_keys, total })
    }

    async fn has_any(&self) -> Result<bool, DomainError> {
        let keys = self.keys.read().await;
        Ok(!keys.is_empty())
    }

    async fn record_usage(&self, id: &str) -> Result<(), DomainError> {
        let mut keys = self.keys.write().await;

        match keys.get_mut(id) {
            Some(key) => {
                key.record_usage();
                Ok(())
            }
            None => Err(DomainError::not_found(format!(
                "API key '{}' not found",
                id
            ))),
        }
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_key(id: &str, key: &str) -> ApiKey {
        ApiKey::new(
            id,
            key,
            format!("Test Key {}", id),
            vec!["recipes:read".to_string()],
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_key("id-1", "dh_aaaa");

        repo.create(key).await.unwrap();

        let fetched = repo.get("id-1").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().name(), "Test Key id-1");
    }

    #[tokio::test]
    async fn test_get_by_key() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();

        let fetched = repo.get_by_key("dh_aaaa").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().id(), "id-1");

        let missing = repo.get_by_key("dh_bbbb").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_injection_shaped_key_is_plain_miss() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();

        let result = repo.get_by_key("' OR '1'='1").await.unwrap();
        assert!(result.is_none());

        let result = repo.get_by_key("dh_aaaa'; DROP TABLE api_keys;--").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_conflict() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();

        let result = repo.create(create_test_key("id-1", "dh_bbbb")).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_key_value_conflict() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();

        let result = repo.create(create_test_key("id-2", "dh_aaaa")).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = InMemoryApiKeyRepository::new();
        let mut key = create_test_key("id-1", "dh_aaaa");
        repo.create(key.clone()).await.unwrap();

        key.set_name("Renamed");
        repo.update(&key).await.unwrap();
        assert_eq!(repo.get("id-1").await.unwrap().unwrap().name(), "Renamed");

        assert!(repo.delete("id-1").await.unwrap());
        assert!(!repo.delete("id-1").await.unwrap());
        assert!(repo.get("id-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let repo = InMemoryApiKeyRepository::new();

        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();
        repo.create(
            create_test_key("id-2", "dh_bbbb").with_user_id("user-7"),
        )
        .await
        .unwrap();
        let mut inactive = create_test_key("id-3", "dh_cccc");
        inactive.set_active(false);
        repo.create(inactive).await.unwrap();

        let all = repo.list(&ListApiKeysParams::default()).await.unwrap();
        assert_eq!(all.total, 3);

        let active = repo
            .list(&ListApiKeysParams {
                is_active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.total, 2);

        let by_user = repo
            .list(&ListApiKeysParams {
                user_id: Some("user-7".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_user.total, 1);
        assert_eq!(by_user.api_keys[0].id(), "id-2");

        let searched = repo
            .list(&ListApiKeysParams {
                search: Some("key id-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.total, 1);

        let page = repo
            .list(&ListApiKeysParams {
                page: 2,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.api_keys.len(), 1);
    }

    #[tokio::test]
    async fn test_has_any() {
        let repo = InMemoryApiKeyRepository::new();
        assert!(!repo.has_any().await.unwrap());

        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();
        assert!(repo.has_any().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_usage() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("id-1", "dh_aaaa")).await.unwrap();

        repo.record_usage("id-1").await.unwrap();
        repo.record_usage("id-1").await.unwrap();

        let key = repo.get("id-1").await.unwrap().unwrap();
        assert_eq!(key.usage_count(), 2);
        assert!(key.last_used_at().is_some());
    }

    #[tokio::test]
    async fn test_record_usage_missing_key() {
        let repo = InMemoryApiKeyRepository::new();
        let result = repo.record_usage("missing").await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
