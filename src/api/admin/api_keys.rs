//! API key management admin endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::api_key::{ApiKey, ListApiKeysParams, Scope};
use crate::domain::usage::UsageStats;
use crate::infrastructure::api_key::{CreateApiKeyRequest, UpdateApiKeyRequest};

/// Request body to create a new API key
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKeyBody {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub permissions: Vec<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 3650))]
    pub expiry_days: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 1, max = 10000))]
    pub rate_limit: Option<i32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Request body to update an API key
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateApiKeyBody {
    #[serde(default)]
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1, max = 10000))]
    pub rate_limit: Option<i32>,
}

/// Request body to renew an API key
#[derive(Debug, Clone, Deserialize)]
pub struct RenewApiKeyBody {
    #[serde(default)]
    pub extend_days: i64,
}

/// Query parameters for listings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListApiKeysQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// API key in responses; the key value is always masked
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub user_id: Option<String>,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub usage_count: i64,
    pub rate_limit: Option<i32>,
    pub rate_limit_used: i32,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id().to_string(),
            key: key.masked_key(),
            name: key.name().to_string(),
            description: key.description().map(String::from),
            user_id: key.user_id().map(String::from),
            permissions: key.permissions().to_vec(),
            is_active: key.is_active(),
            expires_at: key.expires_at().map(|dt| dt.to_rfc3339()),
            last_used_at: key.last_used_at().map(|dt| dt.to_rfc3339()),
            created_at: key.created_at().to_rfc3339(),
            updated_at: key.updated_at().to_rfc3339(),
            usage_count: key.usage_count(),
            rate_limit: key.rate_limit(),
            rate_limit_used: key.rate_limit_used(),
        }
    }
}

/// Creation response; carries the full secret exactly once
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKeyResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub secret: String,
}

/// Paginated listing response
#[derive(Debug, Clone, Serialize)]
pub struct ListApiKeysResponse {
    pub api_keys: Vec<ApiKeyResponse>,
    pub pagination: PaginationResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// POST /admin/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    Json(body): Json<CreateApiKeyBody>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), ApiError> {
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    debug!(name = %body.name, "admin creating API key");

    let created = state
        .api_key_service
        .create(CreateApiKeyRequest {
            name: body.name,
            description: body.description,
            permissions: body.permissions,
            expiry_days: body.expiry_days,
            rate_limit: body.rate_limit,
            user_id: body.user_id,
        })
        .await
        .map_err(ApiError::from)?;

    let response = CreatedApiKeyResponse {
        api_key: ApiKeyResponse::from(&created),
        secret: created.key().to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /admin/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    Query(query): Query<ListApiKeysQuery>,
) -> Result<Json<ListApiKeysResponse>, ApiError> {
    let params = ListApiKeysParams {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(20),
        search: query.search,
        is_active: query.is_active,
        user_id: query.user_id,
    };
    let (page, limit) = params.normalized();

    let result = state
        .api_key_service
        .list(&params)
        .await
        .map_err(ApiError::from)?;

    let api_keys: Vec<ApiKeyResponse> =
        result.api_keys.iter().map(ApiKeyResponse::from).collect();

    Ok(Json(ListApiKeysResponse {
        api_keys,
        pagination: PaginationResponse {
            page,
            limit,
            total: result.total,
            total_pages: (result.total + limit - 1) / limit,
        },
    }))
}

/// GET /admin/api-keys/{id}
pub async fn get_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let api_key = state
        .api_key_service
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("API key '{}' not found", id)))?;

    Ok(Json(ApiKeyResponse::from(&api_key)))
}

/// PUT /admin/api-keys/{id}
pub async fn update_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateApiKeyBody>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let updated = state
        .api_key_service
        .update(
            &id,
            UpdateApiKeyRequest {
                name: body.name,
                description: body.description,
                permissions: body.permissions,
                is_active: body.is_active,
                rate_limit: body.rate_limit,
            },
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiKeyResponse::from(&updated)))
}

/// POST /admin/api-keys/{id}/renew
pub async fn renew_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenewApiKeyBody>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let renewed = state
        .api_key_service
        .renew(&id, body.extend_days)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiKeyResponse::from(&renewed)))
}

/// DELETE /admin/api-keys/{id}
pub async fn delete_api_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .api_key_service
        .delete(&id)
        .await
        .map_err(ApiError::from)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("API key '{}' not found", id)))
    }
}

/// GET /admin/api-keys/{id}/stats
pub async fn get_api_key_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UsageStats>, ApiError> {
    // 404 for unknown ids rather than empty stats
    state
        .api_key_service
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("API key '{}' not found", id)))?;

    let stats = state
        .usage_service
        .stats_for_key(&id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(stats))
}

/// GET /admin/permissions
pub async fn list_permissions(State(state): State<AppState>) -> Json<Vec<Scope>> {
    Json(state.api_key_service.available_scopes().to_vec())
}
