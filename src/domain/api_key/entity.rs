//! API Key entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API Key entity
///
/// The `key` field holds the raw secret (`dh_` prefix + hex payload). It is
/// unique and immutable after creation; listings expose it masked only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique identifier (uuid), immutable
    id: String,
    /// The secret key value, globally unique, immutable
    key: String,
    /// Display name
    name: String,
    /// Optional description of the key's purpose
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    /// Optional owning user
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    /// Granted scopes, non-empty
    permissions: Vec<String>,
    /// Whether the key may be used
    is_active: bool,
    /// Expiration timestamp (None = never expires)
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    /// Last successful validation
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    created_at: DateTime<Utc>,
    /// Last update timestamp
    updated_at: DateTime<Utc>,
    /// Total successful validations, monotonic
    usage_count: i64,
    /// Optional request cap for the key
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit: Option<i32>,
    /// Requests consumed against the cap, monotonic until reset
    rate_limit_used: i32,
}

impl ApiKey {
    /// Create a new API key
    pub fn new(
        id: impl Into<String>,
        key: impl Into<String>,
        name: impl Into<String>,
        permissions: Vec<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: id.into(),
            key: key.into(),
            name: name.into(),
            description: None,
            user_id: None,
            permissions,
            is_active: true,
            expires_at: None,
            last_used_at: None,
            created_at: now,
            updated_at: now,
            usage_count: 0,
            rate_limit: None,
            rate_limit_used: 0,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the owning user
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set expiration
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the per-key request cap
    pub fn with_rate_limit(mut self, rate_limit: i32) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Rehydrate an entity from stored columns
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: String,
        key: String,
        name: String,
        description: Option<String>,
        user_id: Option<String>,
        permissions: Vec<String>,
        is_active: bool,
        expires_at: Option<DateTime<Utc>>,
        last_used_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        usage_count: i64,
        rate_limit: Option<i32>,
        rate_limit_used: i32,
    ) -> Self {
        Self {
            id,
            key,
            name,
            description,
            user_id,
            permissions,
            is_active,
            expires_at,
            last_used_at,
            created_at,
            updated_at,
            usage_count,
            rate_limit,
            rate_limit_used,
        }
    }

    // Getters

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn usage_count(&self) -> i64 {
        self.usage_count
    }

    pub fn rate_limit(&self) -> Option<i32> {
        self.rate_limit
    }

    pub fn rate_limit_used(&self) -> i32 {
        self.rate_limit_used
    }

    /// The key value with the middle elided, safe for listings and logs
    pub fn masked_key(&self) -> String {
        if self.key.len() > 12 {
            format!(
                "{}...{}",
                &self.key[..8],
                &self.key[self.key.len() - 4..]
            )
        } else {
            self.key.clone()
        }
    }

    // Status checks

    /// Check if the key has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Check if the key is active and not expired
    pub fn is_valid(&self) -> bool {
        self.is_active && !self.is_expired()
    }

    // Mutators

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_permissions(&mut self, permissions: Vec<String>) {
        self.permissions = permissions;
        self.touch();
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.touch();
    }

    pub fn set_rate_limit(&mut self, rate_limit: Option<i32>) {
        self.rate_limit = rate_limit;
        self.touch();
    }

    pub fn set_expires_at(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.expires_at = expires_at;
        self.touch();
    }

    /// Record a successful validation: bumps `usage_count`, stamps
    /// `last_used_at`, and consumes one unit of the cap when one is set.
    pub fn record_usage(&mut self) {
        self.usage_count += 1;
        self.last_used_at = Some(Utc::now());

        if self.rate_limit.is_some() {
            self.rate_limit_used += 1;
        }
    }

    /// Explicit reset of the consumed cap. The only path that decreases it.
    pub fn reset_rate_limit_used(&mut self) {
        self.rate_limit_used = 0;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_key(name: &str) -> ApiKey {
        ApiKey::new(
            "key-id-1",
            "dh_0123456789abcdef0123456789abcdef",
            name,
            vec!["recipes:read".to_string()],
        )
    }

    #[test]
    fn test_api_key_creation() {
        let key = create_test_key("Test Key")
            .with_description("A test key")
            .with_user_id("user-1");

        assert_eq!(key.id(), "key-id-1");
        assert_eq!(key.name(), "Test Key");
        assert_eq!(key.description(), Some("A test key"));
        assert_eq!(key.user_id(), Some("user-1"));
        assert!(key.is_active());
        assert!(key.is_valid());
        assert_eq!(key.usage_count(), 0);
        assert_eq!(key.rate_limit_used(), 0);
    }

    #[test]
    fn test_api_key_expiration() {
        let past = Utc::now() - chrono::Duration::hours(1);
        let key = create_test_key("Test Key").with_expires_at(past);

        assert!(key.is_expired());
        assert!(!key.is_valid());
    }

    #[test]
    fn test_api_key_no_expiry() {
        let key = create_test_key("Test Key");

        assert!(!key.is_expired());
        assert!(key.is_valid());
    }

    #[test]
    fn test_inactive_key_is_invalid() {
        let mut key = create_test_key("Test Key");
        key.set_active(false);

        assert!(!key.is_expired());
        assert!(!key.is_valid());
    }

    #[test]
    fn test_record_usage_without_cap() {
        let mut key = create_test_key("Test Key");

        key.record_usage();
        key.record_usage();

        assert_eq!(key.usage_count(), 2);
        assert!(key.last_used_at().is_some());
        // No cap configured, so nothing is consumed against it
        assert_eq!(key.rate_limit_used(), 0);
    }

    #[test]
    fn test_record_usage_with_cap() {
        let mut key = create_test_key("Test Key").with_rate_limit(100);

        key.record_usage();
        key.record_usage();
        key.record_usage();

        assert_eq!(key.usage_count(), 3);
        assert_eq!(key.rate_limit_used(), 3);

        key.reset_rate_limit_used();
        assert_eq!(key.rate_limit_used(), 0);
        // usage_count is monotonic and unaffected by the reset
        assert_eq!(key.usage_count(), 3);
    }

    #[test]
    fn test_masked_key() {
        let key = create_test_key("Test Key");
        let masked = key.masked_key();

        assert!(masked.starts_with("dh_01234"));
        assert!(masked.ends_with("cdef"));
        assert!(masked.contains("..."));
        assert_ne!(masked, key.key());
    }

    #[test]
    fn test_masked_key_short_value() {
        let key = ApiKey::new("id", "short", "Name", vec!["read".to_string()]);
        assert_eq!(key.masked_key(), "short");
    }

    #[test]
    fn test_mutators_touch_updated_at() {
        let mut key = create_test_key("Test Key");
        let created = key.updated_at();

        key.set_name("Renamed");

        assert_eq!(key.name(), "Renamed");
        assert!(key.updated_at() >= created);
    }
}
