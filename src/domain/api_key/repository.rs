//! API Key repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::ApiKey;
use crate::domain::DomainError;

/// Filters and pagination for key listings
#[derive(Debug, Clone, Default)]
pub struct ListApiKeysParams {
    /// 1-based page number; values < 1 are treated as 1
    pub page: i64,
    /// Page size; values outside 1..=100 fall back to 20
    pub limit: i64,
    /// Substring match over name and description
    pub search: Option<String>,
    /// Filter by active flag
    pub is_active: Option<bool>,
    /// Filter by owning user
    pub user_id: Option<String>,
}

impl ListApiKeysParams {
    /// Page/limit with defaults applied
    pub fn normalized(&self) -> (i64, i64) {
        let page = if self.page < 1 { 1 } else { self.page };
        let limit = if self.limit < 1 || self.limit > 100 {
            20
        } else {
            self.limit
        };
        (page, limit)
    }
}

/// A page of keys plus the total count matching the filters
#[derive(Debug, Clone)]
pub struct ApiKeyPage {
    pub api_keys: Vec<ApiKey>,
    pub total: i64,
}

/// Repository trait for API key storage
///
/// Implementations must use parameterized lookups only; a raw key that does
/// not match a stored key yields `Ok(None)` with no other observable
/// difference from any other miss.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Get an API key by its ID
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Get an API key by its raw secret value
    async fn get_by_key(&self, key: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Create a new API key. Fails with `Conflict` when the id or the key
    /// value already exists.
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Update an existing API key
    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError>;

    /// Delete an API key (cascades to its usage rows)
    async fn delete(&self, id: &str) -> Result<bool, DomainError>;

    /// List keys with filters and pagination
    async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError>;

    /// Whether any key exists at all
    async fn has_any(&self) -> Result<bool, DomainError>;

    /// Bump usage telemetry for a key: `usage_count`, `last_used_at`, and
    /// `rate_limit_used` when a cap is configured.
    async fn record_usage(&self, id: &str) -> Result<(), DomainError>;

    /// Release any held handles. Idempotent; safe to call more than once.
    async fn close(&self);
}
