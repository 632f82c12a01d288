//! Scope enforcement middleware
//!
//! Route layers that authenticate the `X-API-Key` header and check the
//! resolved key's scopes with ANY or ALL semantics. A failed key is a 401;
//! a valid key without the required scopes is a 403. On success the
//! resolved key record is stored in request extensions for the handler and
//! the usage recorder.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::admission::AdmissionPhase;

use super::auth::extract_api_key;

/// ANY semantics: the key must hold at least one required scope
pub async fn enforce_any(
    state: AppState,
    required: Vec<String>,
    request: Request,
    next: Next,
) -> Response {
    enforce(state, required, ScopeMode::Any, request, next).await
}

/// ALL semantics: the key must hold every required scope
pub async fn enforce_all(
    state: AppState,
    required: Vec<String>,
    request: Request,
    next: Next,
) -> Response {
    enforce(state, required, ScopeMode::All, request, next).await
}

#[derive(Debug, Clone, Copy)]
enum ScopeMode {
    Any,
    All,
}

async fn enforce(
    state: AppState,
    required: Vec<String>,
    mode: ScopeMode,
    mut request: Request,
    next: Next,
) -> Response {
    let raw_key = match extract_api_key(request.headers()) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    let result = match mode {
        ScopeMode::Any => state.api_key_service.authorize_any(&raw_key, &required).await,
        ScopeMode::All => state.api_key_service.authorize_all(&raw_key, &required).await,
    };

    match result {
        Ok((api_key, true)) => {
            debug!(
                id = %api_key.id(),
                phase = %AdmissionPhase::ScopeAuthorized,
                "scope check passed"
            );
            request.extensions_mut().insert(api_key);
            next.run(request).await
        }
        Ok((api_key, false)) => {
            debug!(id = %api_key.id(), "scope check failed");
            ApiError::forbidden("insufficient permissions").into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request as HttpRequest, http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::api_key::ApiKey;
    use crate::infrastructure::admission::{AdmissionConfig, AdmissionController};
    use crate::infrastructure::api_key::{
        ApiKeyService, CreateApiKeyRequest, InMemoryApiKeyRepository,
    };
    use crate::infrastructure::auth::{JwtConfig, JwtService};
    use crate::infrastructure::identity::IdentityResolver;
    use crate::infrastructure::usage::{InMemoryUsageRepository, UsageTrackingService};

    fn test_state() -> AppState {
        let repo = Arc::new(InMemoryApiKeyRepository::new());
        let jwt = Arc::new(JwtService::new(JwtConfig::new("test-secret", 24)));

        AppState::new(
            Arc::new(ApiKeyService::new(repo)),
            Arc::new(UsageTrackingService::new(Arc::new(
                InMemoryUsageRepository::new(),
            ))),
            Arc::new(AdmissionController::new(AdmissionConfig::default())),
            Arc::new(IdentityResolver::new(jwt)),
        )
    }

    async fn create_key(state: &AppState, permissions: &[&str]) -> ApiKey {
        state
            .api_key_service
            .create(CreateApiKeyRequest {
                name: "test key".to_string(),
                description: None,
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                expiry_days: None,
                rate_limit: None,
                user_id: None,
            })
            .await
            .unwrap()
    }

    fn guarded_router(state: AppState, required: &[&str], all: bool) -> Router {
        let required: Vec<String> = required.iter().map(|s| s.to_string()).collect();
        let mw_state = state.clone();

        let layer = middleware::from_fn(move |request: Request, next: Next| {
            let state = mw_state.clone();
            let required = required.clone();
            async move {
                if all {
                    enforce_all(state, required, request, next).await
                } else {
                    enforce_any(state, required, request, next).await
                }
            }
        });

        Router::new()
            .route(
                "/guarded",
                get(|Extension(key): Extension<ApiKey>| async move { key.id().to_string() }),
            )
            .route_layer(layer)
            .with_state(state)
    }

    async fn call(router: Router, key: Option<&str>) -> StatusCode {
        let mut builder = HttpRequest::builder().uri("/guarded");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn test_any_passes_with_one_matching_scope() {
        let state = test_state();
        let key = create_key(&state, &["recipes:read", "meals:read"]).await;

        let router = guarded_router(state, &["recipes:read", "workouts:read"], false);
        assert_eq!(call(router, Some(key.key())).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_any_rejects_without_overlap() {
        let state = test_state();
        let key = create_key(&state, &["meals:read"]).await;

        let router = guarded_router(state, &["workouts:read"], false);
        assert_eq!(call(router, Some(key.key())).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_all_requires_every_scope() {
        let state = test_state();
        let key = create_key(&state, &["recipes:read", "recipes:write"]).await;

        let router = guarded_router(
            state.clone(),
            &["recipes:read", "recipes:write"],
            true,
        );
        assert_eq!(call(router, Some(key.key())).await, StatusCode::OK);

        let router = guarded_router(state, &["recipes:read", "workouts:read"], true);
        assert_eq!(call(router, Some(key.key())).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let state = test_state();
        let router = guarded_router(state, &["recipes:read"], false);

        assert_eq!(call(router, None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_key_is_unauthorized_not_forbidden() {
        let state = test_state();
        let router = guarded_router(state, &["recipes:read"], false);

        assert_eq!(
            call(router, Some("dh_bogus")).await,
            StatusCode::UNAUTHORIZED
        );
    }
}
