//! Router assembly
//!
//! The admission chain has one composition point: [`apply_admission_gates`]
//! wires Gate A (IP), identity resolution, and Gate B (identity) in that
//! fixed order. Generation routers additionally wrap themselves with
//! [`apply_quota_gate`] (Gate C) before mounting. Key authentication and
//! scope checks come last, as route layers on the protected routes.

use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::get,
    Router,
};
use tower::ServiceBuilder;

use crate::api::middleware::{identity_gate, ip_gate, quota_gate, resolve_identity};
use crate::api::state::AppState;
use crate::api::{admin, health};

/// Wrap a router with the admission chain: IP gate, then identity
/// resolution, then the per-identity gate.
pub fn apply_admission_gates(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let s1 = state.clone();
    let s2 = state.clone();
    let s3 = state.clone();

    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(move |request: Request, next: Next| {
                let state = s1.clone();
                async move { ip_gate(state, request, next).await }
            }))
            .layer(middleware::from_fn(move |request: Request, next: Next| {
                let state = s2.clone();
                async move { resolve_identity(state, request, next).await }
            }))
            .layer(middleware::from_fn(move |request: Request, next: Next| {
                let state = s3.clone();
                async move { identity_gate(state, request, next).await }
            })),
    )
}

/// Wrap a generation/mutation router with the monthly quota gate. Read
/// routers must not use this.
pub fn apply_quota_gate(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let state = state.clone();

    router.route_layer(middleware::from_fn(move |request: Request, next: Next| {
        let state = state.clone();
        async move { quota_gate(state, request, next).await }
    }))
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let admin_routes = admin::create_admin_router(state.clone());
    let gated = apply_admission_gates(
        Router::new().nest("/admin", admin_routes),
        &state,
    );

    Router::new()
        // Liveness probe stays outside the admission chain
        .route("/health", get(health::health_check))
        .merge(gated)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    use super::*;
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

    async fn create_admin_key(state: &AppState) -> String {
        state
            .api_key_service
            .create(CreateApiKeyRequest {
                name: "admin key".to_string(),
                description: None,
                permissions: vec!["admin:all".to_string()],
                expiry_days: None,
                rate_limit: None,
                user_id: None,
            })
            .await
            .unwrap()
            .key()
            .to_string()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let router = create_router(test_state());

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_requires_key() {
        let router = create_router(test_state());

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/admin/api-keys")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_rejects_non_admin_scope() {
        let state = test_state();
        let key = state
            .api_key_service
            .create(CreateApiKeyRequest {
                name: "reader key".to_string(),
                description: None,
                permissions: vec!["recipes:read".to_string()],
                expiry_days: None,
                rate_limit: None,
                user_id: None,
            })
            .await
            .unwrap();

        let router = create_router(state);
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .uri("/admin/api-keys")
                    .header("x-api-key", key.key())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_end_to_end() {
        let state = test_state();
        let admin_key = create_admin_key(&state).await;
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/admin/api-keys")
                    .header("x-api-key", &admin_key)
                    .header("cookie", "anon_id=admin-browser")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["pagination"]["total"], 1);

        // The listed key value is masked
        let listed_key = json["api_keys"][0]["key"].as_str().unwrap();
        assert!(listed_key.contains("..."));
        assert_ne!(listed_key, admin_key);
    }

    #[tokio::test]
    async fn test_quota_gate_helper_bounds_generation_routes() {
        use axum::routing::post;

        let state = test_state();
        let generate = apply_quota_gate(
            Router::new().route("/generate", post(|| async { "generated" })),
            &state,
        );
        let router = apply_admission_gates(generate, &state).with_state(state);

        let make_request = || {
            HttpRequest::builder()
                .method("POST")
                .uri("/generate")
                .header("cookie", "anon_id=helper-test")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..3 {
            let response = router.clone().oneshot(make_request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router.oneshot(make_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_gate_rejection_short_circuits_auth() {
        use crate::infrastructure::admission::RateConfig;

        let repo = Arc::new(InMemoryApiKeyRepository::new());
        let jwt = Arc::new(JwtService::new(JwtConfig::new("test-secret", 24)));
        let state = AppState::new(
            Arc::new(ApiKeyService::new(repo)),
            Arc::new(UsageTrackingService::new(Arc::new(
                InMemoryUsageRepository::new(),
            ))),
            Arc::new(AdmissionController::new(AdmissionConfig {
                ip_rate: RateConfig {
                    requests_per_second: 0.01,
                    burst: 1,
                },
                ..AdmissionConfig::default()
            })),
            Arc::new(IdentityResolver::new(jwt)),
        );

        let admin_key = create_admin_key(&state).await;
        let router = create_router(state);

        let make_request = || {
            HttpRequest::builder()
                .uri("/admin/api-keys")
                .header("x-api-key", &admin_key)
                .header("x-forwarded-for", "203.0.113.7")
                .header("cookie", "anon_id=one-browser")
                .body(Body::empty())
                .unwrap()
        };

        let response = router.clone().oneshot(make_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The IP gate rejects before key authentication ever runs: a valid
        // admin key still gets a 429
        let response = router.oneshot(make_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
