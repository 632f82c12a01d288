//! Application state for shared services

use std::sync::Arc;

use crate::domain::api_key::{ApiKey, ApiKeyPage, ApiKeyRepository, ListApiKeysParams, Scope};
use crate::domain::DomainError;
use crate::infrastructure::admission::AdmissionController;
use crate::infrastructure::api_key::{ApiKeyService, CreateApiKeyRequest, UpdateApiKeyRequest};
use crate::infrastructure::identity::IdentityResolver;
use crate::infrastructure::usage::UsageTrackingService;

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub api_key_service: Arc<dyn ApiKeyServiceTrait>,
    pub usage_service: Arc<UsageTrackingService>,
    pub admission: Arc<AdmissionController>,
    pub identity_resolver: Arc<IdentityResolver>,
}

impl AppState {
    pub fn new(
        api_key_service: Arc<dyn ApiKeyServiceTrait>,
        usage_service: Arc<UsageTrackingService>,
        admission: Arc<AdmissionController>,
        identity_resolver: Arc<IdentityResolver>,
    ) -> Self {
        Self {
            api_key_service,
            usage_service,
            admission,
            identity_resolver,
        }
    }
}

/// Trait for API key service operations
#[async_trait::async_trait]
pub trait ApiKeyServiceTrait: Send + Sync {
    async fn create(&self, request: CreateApiKeyRequest) -> Result<ApiKey, DomainError>;
    async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError>;
    async fn validate(&self, raw_key: &str) -> Result<ApiKey, DomainError>;
    async fn authorize_any(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError>;
    async fn authorize_all(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError>;
    async fn update(
        &self,
        id: &str,
        request: UpdateApiKeyRequest,
    ) -> Result<ApiKey, DomainError>;
    async fn renew(&self, id: &str, extend_days: i64) -> Result<ApiKey, DomainError>;
    async fn delete(&self, id: &str) -> Result<bool, DomainError>;
    async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError>;
    async fn has_any_keys(&self) -> Result<bool, DomainError>;
    fn available_scopes(&self) -> &'static [Scope];
    async fn close(&self);
}

#[async_trait::async_trait]
impl<R: ApiKeyRepository + 'static> ApiKeyServiceTrait for ApiKeyService<R> {
    async fn create(&self, request: CreateApiKeyRequest) -> Result<ApiKey, DomainError> {
        ApiKeyService::create(self, request).await
    }

    async fn get(&self, id: &str) -> Result<Option<ApiKey>, DomainError> {
        ApiKeyService::get(self, id).await
    }

    async fn validate(&self, raw_key: &str) -> Result<ApiKey, DomainError> {
        ApiKeyService::validate(self, raw_key).await
    }

    async fn authorize_any(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError> {
        ApiKeyService::authorize_any(self, raw_key, required).await
    }

    async fn authorize_all(
        &self,
        raw_key: &str,
        required: &[String],
    ) -> Result<(ApiKey, bool), DomainError> {
        ApiKeyService::authorize_all(self, raw_key, required).await
    }

    async fn update(
        &self,
        id: &str,
        request: UpdateApiKeyRequest,
    ) -> Result<ApiKey, DomainError> {
        ApiKeyService::update(self, id, request).await
    }

    async fn renew(&self, id: &str, extend_days: i64) -> Result<ApiKey, DomainError> {
        ApiKeyService::renew(self, id, extend_days).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        ApiKeyService::delete(self, id).await
    }

    async fn list(&self, params: &ListApiKeysParams) -> Result<ApiKeyPage, DomainError> {
        ApiKeyService::list(self, params).await
    }

    async fn has_any_keys(&self) -> Result<bool, DomainError> {
        ApiKeyService::has_any_keys(self).await
    }

    fn available_scopes(&self) -> &'static [Scope] {
        ApiKeyService::available_scopes(self)
    }

    async fn close(&self) {
        ApiKeyService::close(self).await
    }
}
