//! API key authentication middleware

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::admission::AdmissionPhase;
use crate::domain::api_key::ApiKey;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Extractor that requires a valid API key in the `X-API-Key` header
#[derive(Debug, Clone)]
pub struct RequireApiKey(pub ApiKey);

impl FromRequestParts<AppState> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw_key = extract_api_key(&parts.headers)?;

        let api_key = state
            .api_key_service
            .validate(&raw_key)
            .await
            .map_err(ApiError::from)?;

        debug!(
            id = %api_key.id(),
            phase = %AdmissionPhase::KeyAuthenticated,
            "API key authenticated"
        );

        parts.extensions.insert(api_key.clone());
        Ok(RequireApiKey(api_key))
    }
}

/// Pull the raw key out of the `X-API-Key` header
pub fn extract_api_key(headers: &axum::http::HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(API_KEY_HEADER)
        .ok_or_else(|| ApiError::unauthorized("API key required"))?;

    let key = value
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid X-API-Key header encoding"))?
        .trim();

    if key.is_empty() {
        return Err(ApiError::unauthorized("API key required"));
    }

    Ok(key.to_string())
}
