//! API Key service
//!
//! High-level operations for key issuance, validation, and scope-based
//! authorization.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::api_key::{
    has_all_scopes, has_any_scope, is_known_scope, ApiKey, ApiKeyPage, ApiKeyRepository,
    ListApiKeysParams, Scope, AVAILABLE_SCOPES,
};
use crate::domain::DomainError;

use super::generator::ApiKeyGenerator;

/// How many times key generation is retried when the generated secret
/// collides with an existing row. A collision is practically impossible with
/// 32 random bytes, but the store reports it and we handle it.
const CREATE_RETRIES: usize = 3;

/// Request to create a new key
#[derive(Debug, Clone)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    /// Days until expiry; falls back to the configured default when absent
    pub expiry_days: Option<i64>,
    pub rate_limit: Option<i32>,
    pub user_id: Option<String>,
}

/// Partial update of an existing key
#[derive(Debug, Clone, Default)]
pub struct UpdateApiKeyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub rate_limit: Option<i32>,
}

/// API Key service
#[derive(Debug)]
pub struct ApiKeyService<R>
where
    R: ApiKeyRepository,
{
    repository: Arc<R>,
    generator: ApiKeyGenerator,
    /// Default expiry applied when a create request has no `expiry_days`
    default_expiry_days: i64,
}

impl<R: ApiKeyRepository> ApiKeyService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            generator: ApiKeyGenerator::default(),
            default_expiry_days: 365,
        }
    }

    pub fn with_generator(mut self, generator: ApiKeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_default_expiry_days(mut self, days: i64) -> Self {
        self.default_expiry_days = days;
        self
    }

    /// Create a new API key. The returned entity carries the full secret;
    /// this is the only time it is exposed unmasked.
    pub async fn create(&self, request: CreateApiKeyRequest) -> Result<ApiKey, DomainError> {
        validate_create_request(&request)?;

        let expiry_days = request.expiry_days.unwrap_or(self.default_expiry_days);
        let expires_at = Utc::now() + Duration::days(expiry_days);

        let mut last_err = None;

        for _ in 0..CREATE_RETRIES {
            let id = Uuid::new_v4().to_string();
            let secret = self.generator.generate();

            let mut api_key = ApiKey::new(&id, &secret, &request.name, request.permissions.clone())
                .with_expires_at(expires_at);

            if let Some(description) = &request.description {
                api_key = api_key.with_description(description);
            }
            if let Some(user_id) = &request.user_id {
                api_key = api_key.with_user_id(user_id);
            }
            if let Some(rate_limit) = request.rate_limit {
                api_key = api_key.with_rate_limit(rate_limit);
            }

            match self.repository.create(api_key).await {
                Ok(created) => {
                    info!(id = %created.id(), name = %created.name(), "API key created");
                    return Ok(created);
                }
                Err(DomainError::Conflict { .. }) => {
                    // Regenerate id and secret and try again
                    warn!("generated API key collided, retrying");
                    last_err = Some(DomainError::internal(
                        "failed to generate a unique API key",
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DomainError::internal("failed to generate a unique API key")
        }))
    }

    /// Get a key by ID
    pub async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError> {
        if id.is_empty() {
            return Err(DomainError::validation("API key ID cannot be empty"));
        }
        self.repository.get(id).await
    }

    /// Look up a key by its raw secret. Every miss, whatever the input
    /// looked like, produces the identical error.
    pub async fn get_by_key(&self, raw_key: &str) -> Result<ApiKey, DomainError> {
        if raw_key.is_empty() {
            return Err(DomainError::authentication("API key not found"));
        }

        self.repository
            .get_by_key(raw_key)
            .await?
            .ok_or_else(|| DomainError::authentication("API key not found"))
    }

    /// Validate a raw key: it must exist, be active, and not be expired.
    /// On success, usage telemetry is updated best-effort; a storage failure
    /// there is logged and does not fail the validation.
    pub async fn validate(&self, raw_key: &str) -> Result<ApiKey, DomainError> {
        let mut api_key = self.get_by_key(raw_key).await?;

        if !api_key.is_active() {
            debug!(id = %api_key.id(), "rejected inactive API key");
            return Err(DomainError::authentication("API key is not active"));
        }

        if api_key.is_expired() {
            debug!(id = %api_key.id(), "rejected expired API key");
            return Err(DomainError::authentication("API key has expired"));
        }

        match self.repository.record_usage(api_key.id()).await {
            Ok(()) => api_key.record_usage(),
            Err(e) => {
                // Availability over audit completeness: the validation
                // already succeeded, so a telemetry write failure must not
                // turn it into a rejection.
                warn!(id = %api_key.id(), error = %e, "failed to record API key usage");
            }
        }

        Ok(api_key)
    }

    /// Validate the key and check that it holds at least one required scope.
    /// `Err` means the key itself failed authentication; `false` means a
    /// valid key without sufficient scope.
    pub async fn authorize_any(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError> {
        let api_key = self.validate(raw_key).await?;
        let authorized = has_any_scope(api_key.permissions(), required);
        Ok((api_key, authorized))
    }

    /// Validate the key and check that it holds all required scopes.
    pub async fn authorize_all(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError> {
        let api_key = self.validate(raw_key).await?;
        let authorized = has_all_scopes(api_key.permissions(), required);
        Ok((api_key, authorized))
    }

    /// Update a key
    pub async fn update(
        &self,
        id: &str,
        request: UpdateApiKeyRequest,
    ) -> Result<ApiKey, DomainError> {
        validate_update_request(&request)?;

        let mut api_key = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        if let Some(name) = request.name {
            api_key.set_name(name);
        }
        if let Some(description) = request.description {
            api_key.set_description(Some(description));
        }
        if let Some(permissions) = request.permissions {
            api_key.set_permissions(permissions);
        }
        if let Some(is_active) = request.is_active {
            api_key.set_active(is_active);
        }
        if let Some(rate_limit) = request.rate_limit {
            api_key.set_rate_limit(Some(rate_limit));
        }

        info!(id = %id, "API key updated");
        self.repository.update(&api_key).await
    }

    /// Extend a key's expiry. With `extend_days <= 0` the configured default
    /// is applied relative to now; otherwise the expiry becomes
    /// `max(current_expiry, now) + extend_days`.
    pub async fn renew(&self, id: &str, extend_days: i64) -> Result<ApiKey, DomainError> {
        let mut api_key = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        let now = Utc::now();
        let new_expiry = if extend_days <= 0 {
            now + Duration::days(self.default_expiry_days)
        } else {
            let base = match api_key.expires_at() {
                Some(expires) if expires > now => expires,
                _ => now,
            };
            base + Duration::days(extend_days)
        };

        api_key.set_expires_at(Some(new_expiry));

        info!(id = %id, expires_at = %new_expiry, "API key renewed");
        self.repository.update(&api_key).await
    }

    /// Delete a key (usage rows cascade)
    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        if id.is_empty() {
            return Err(DomainError::validation("API key ID cannot be empty"));
        }

        let deleted = self.repository.delete(id).await?;
        if deleted {
            info!(id = %id, "API key deleted");
        }
        Ok(deleted)
    }

    /// List keys with filters and pagination
    pub async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError> {
        self.repository.list(params).await
    }

    /// Whether any key exists at all
    pub async fn has_any_keys(&self) -> Result<bool, DomainError> {
        self.repository.has_any().await
    }

    /// The scope registry, for discovery endpoints
    pub fn available_scopes(&self) -> &'static [Scope] {
        &AVAILABLE_SCOPES
    }

    /// Release storage handles. Idempotent.
    pub async fn close(&self) {
        self.repository.close().await;
    }
}

fn validate_create_request(request: &CreateApiKeyRequest) -> Result<(), DomainError> {
    if request.name.is_empty() {
        return Err(DomainError::validation("name is required"));
    }
    if request.name.len() < 2 || request.name.len() > 100 {
        return Err(DomainError::validation(
            "name must be between 2 and 100 characters",
        ));
    }
    if let Some(description) = &request.description {
        if description.len() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
    }
    if request.permissions.is_empty() {
        return Err(DomainError::validation(
            "at least one permission is required",
        ));
    }
    if let Some(days) = request.expiry_days {
        if !(1..=3650).contains(&days) {
            return Err(DomainError::validation(
                "expiry days must be between 1 and 3650",
            ));
        }
    }
    if let Some(rate_limit) = request.rate_limit {
        if !(1..=10_000).contains(&rate_limit) {
            return Err(DomainError::validation(
                "rate limit must be between 1 and 10000",
            ));
        }
    }

    validate_scope_tokens(&request.permissions)
}

fn validate_update_request(request: &UpdateApiKeyRequest) -> Result<(), DomainError> {
    if let Some(name) = &request.name {
        if name.len() < 2 || name.len() > 100 {
            return Err(DomainError::validation(
                "name must be between 2 and 100 characters",
            ));
        }
    }
    if let Some(description) = &request.description {
        if description.len() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
    }
    if let Some(permissions) = &request.permissions {
        if permissions.is_empty() {
            return Err(DomainError::validation(
                "at least one permission is required",
            ));
        }
        validate_scope_tokens(permissions)?;
    }
    if let Some(rate_limit) = request.rate_limit {
        if !(1..=10_000).contains(&rate_limit) {
            return Err(DomainError::validation(
                "rate limit must be between 1 and 10000",
            ));
        }
    }

    Ok(())
}

fn validate_scope_tokens(permissions: &[String]) -> Result<(), DomainError> {
    for token in permissions {
        if !is_known_scope(token) {
            return Err(DomainError::validation(format!(
                "invalid permission: {}",
                token
            )));
        }
    }
    Ok(())
}
