//! Admission gate middleware
//!
//! The gates run in a fixed order: the IP limiter first, then identity
//! resolution, then the per-identity limiter, then (on generation routes
//! only) the monthly quota. Any rejection short-circuits the rest of the
//! chain, and nothing is counted for work that was never admitted.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::admission::AdmissionPhase;
use crate::infrastructure::identity::ResolvedIdentity;

/// Gate A: token bucket per source IP
pub async fn ip_gate(state: AppState, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);

    match state.admission.check_ip(ip) {
        Ok(()) => {
            debug!(phase = %AdmissionPhase::IpChecked, "IP gate passed");
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Identity resolution. Stores the resolved identity in request extensions
/// and attaches the minted `anon_id` cookie to the response when one was
/// created.
pub async fn resolve_identity(state: AppState, mut request: Request, next: Next) -> Response {
    let resolved = state.identity_resolver.resolve(request.headers());

    debug!(
        identity = %resolved.identity,
        phase = %AdmissionPhase::IdentityResolved,
        "identity resolved"
    );

    let set_cookie = resolved.set_cookie.clone();
    request.extensions_mut().insert(resolved);

    let mut response = next.run(request).await;

    if let Some(cookie) = set_cookie {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

/// Gate B: token bucket per resolved identity. Must run after
/// [`resolve_identity`].
pub async fn identity_gate(state: AppState, request: Request, next: Next) -> Response {
    let Some(resolved) = request.extensions().get::<ResolvedIdentity>() else {
        error!("identity gate reached without a resolved identity");
        return ApiError::internal().into_response();
    };

    match state.admission.check_identity(&resolved.identity) {
        Ok(()) => {
            debug!(phase = %AdmissionPhase::RateChecked, "identity gate passed");
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Gate C: monthly quota. Mounted on generation/mutation routes only; read
/// routes never pass through this layer. The check and the increment are
/// atomic, so concurrent requests can never overshoot the limit.
pub async fn quota_gate(state: AppState, request: Request, next: Next) -> Response {
    let Some(resolved) = request.extensions().get::<ResolvedIdentity>() else {
        error!("quota gate reached without a resolved identity");
        return ApiError::internal().into_response();
    };

    let decision = match state.admission.check_quota(
        &resolved.identity,
        resolved.plan,
        resolved.shared_bonus,
    ) {
        Ok(decision) => decision,
        Err(err) => return ApiError::from(err).into_response(),
    };

    debug!(phase = %AdmissionPhase::QuotaChecked, "quota gate passed");

    let mut response = next.run(request).await;

    // Quota hints for well-behaved clients
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.used.to_string()) {
        headers.insert("x-quota-used", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-quota-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(decision.plan.as_str()) {
        headers.insert("x-quota-plan", value);
    }

    response
}

/// Source address for the request: the first `X-Forwarded-For` entry when
/// present, otherwise the peer address.
fn client_ip(request: &Request) -> Option<IpAddr> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::{ServiceBuilder, ServiceExt};

    use super::*;
    use crate::infrastructure::admission::{AdmissionConfig, AdmissionController, RateConfig};
    use crate::infrastructure::api_key::{ApiKeyService, InMemoryApiKeyRepository};
    use crate::infrastructure::auth::{JwtConfig, JwtService};
    use crate::infrastructure::identity::IdentityResolver;
    use crate::infrastructure::usage::{InMemoryUsageRepository, UsageTrackingService};

    fn test_state(admission: AdmissionConfig) -> AppState {
        let repo = Arc::new(InMemoryApiKeyRepository::new());
        let jwt = Arc::new(JwtService::new(JwtConfig::new("test-secret", 24)));

        AppState::new(
            Arc::new(ApiKeyService::new(repo)),
            Arc::new(UsageTrackingService::new(Arc::new(
                InMemoryUsageRepository::new(),
            ))),
            Arc::new(AdmissionController::new(admission)),
            Arc::new(IdentityResolver::new(jwt)),
        )
    }

    fn tight_ip_config() -> AdmissionConfig {
        AdmissionConfig {
            ip_rate: RateConfig {
                requests_per_second: 0.01,
                burst: 2,
            },
            ..AdmissionConfig::default()
        }
    }

    fn tight_identity_config() -> AdmissionConfig {
        AdmissionConfig {
            identity_rate: RateConfig {
                requests_per_second: 0.01,
                burst: 2,
            },
            ..AdmissionConfig::default()
        }
    }

    /// Rate gates wide open, so only the quota gate can reject
    fn quota_only_config() -> AdmissionConfig {
        AdmissionConfig {
            ip_rate: RateConfig {
                requests_per_second: 10_000.0,
                burst: 10_000,
            },
            identity_rate: RateConfig {
                requests_per_second: 10_000.0,
                burst: 10_000,
            },
            ..AdmissionConfig::default()
        }
    }

    /// The full chain in its fixed order, with the quota gate on the
    /// generate route only.
    fn chained_router(state: AppState) -> Router {
        let s1 = state.clone();
        let s2 = state.clone();
        let s3 = state.clone();
        let s4 = state.clone();

        let generate = Router::new()
            .route("/generate", post(|| async { "generated" }))
            .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                let state = s4.clone();
                async move { quota_gate(state, req, next).await }
            }));

        Router::new()
            .route("/read", get(|| async { "data" }))
            .merge(generate)
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn(move |req: Request, next: Next| {
                        let state = s1.clone();
                        async move { ip_gate(state, req, next).await }
                    }))
                    .layer(middleware::from_fn(move |req: Request, next: Next| {
                        let state = s2.clone();
                        async move { resolve_identity(state, req, next).await }
                    }))
                    .layer(middleware::from_fn(move |req: Request, next: Next| {
                        let state = s3.clone();
                        async move { identity_gate(state, req, next).await }
                    })),
            )
            .with_state(state)
    }

    fn request(method: &str, uri: &str, cookie: Option<&str>, ip: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ip_gate_limits_and_hints_retry() {
        let router = chained_router(test_state(tight_ip_config()));

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(request("GET", "/read", Some("anon_id=a"), Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .clone()
            .oneshot(request("GET", "/read", Some("anon_id=a"), Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "too_many_requests");
        assert!(json["retry_after"].as_u64().unwrap() >= 1);

        // A different source address is unaffected
        let response = router
            .oneshot(request("GET", "/read", Some("anon_id=a"), Some("203.0.113.8")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_identity_gate_limits_across_ips() {
        let router = chained_router(test_state(tight_identity_config()));

        // Same identity from rotating addresses still hits the cap
        for ip in ["203.0.113.1", "203.0.113.2"] {
            let response = router
                .clone()
                .oneshot(request("GET", "/read", Some("anon_id=rotator"), Some(ip)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .oneshot(request("GET", "/read", Some("anon_id=rotator"), Some("203.0.113.3")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_anon_cookie_minted_once() {
        let router = chained_router(test_state(AdmissionConfig::default()));

        let response = router
            .clone()
            .oneshot(request("GET", "/read", None, Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get("set-cookie")
            .expect("anon cookie should be minted")
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("anon_id="));
        assert!(set_cookie.contains("HttpOnly"));

        // A request that already carries the cookie gets no new one
        let response = router
            .oneshot(request("GET", "/read", Some("anon_id=existing"), Some("203.0.113.7")))
            .await
            .unwrap();
        assert!(response.headers().get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn test_quota_applies_to_generate_routes_only() {
        let router = chained_router(test_state(AdmissionConfig::default()));
        let cookie = "anon_id=quota-test";

        // Free plan: three generations pass, the fourth is rejected
        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-quota-used"));
        }

        let response = router
            .clone()
            .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "quota_exceeded");
        assert_eq!(json["used"], 3);
        assert_eq!(json["limit"], 3);
        assert_eq!(json["plan"], "free");
        assert!(json["resets"].as_str().unwrap().contains("T"));

        // Read routes never consume quota
        for _ in 0..5 {
            let response = router
                .clone()
                .oneshot(request("GET", "/read", Some(cookie), Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_quota_plan_cookies() {
        let router = chained_router(test_state(quota_only_config()));

        // Shared bonus raises the free tier to eleven
        let cookie = "anon_id=bonus-user; shared=yes";
        for _ in 0..11 {
            let response = router
                .clone()
                .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = router
            .clone()
            .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // An unrecognized shared value keeps the default limit of three
        let cookie = "anon_id=no-bonus; shared=definitely";
        for _ in 0..3 {
            router
                .clone()
                .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
                .await
                .unwrap();
        }
        let response = router
            .clone()
            .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Pro plan gets fifty
        let cookie = "anon_id=pro-user; plan=pro";
        for _ in 0..50 {
            let response = router
                .clone()
                .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = router
            .oneshot(request("POST", "/generate", Some(cookie), Some("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_bearer_identity_used_for_quota() {
        let jwt = JwtService::new(JwtConfig::new("test-secret", 24));
        let token = jwt.generate("user-42").unwrap();

        let router = chained_router(test_state(AdmissionConfig::default()));

        for _ in 0..3 {
            let req = HttpRequest::builder()
                .method("POST")
                .uri("/generate")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap();
            let response = router.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let req = HttpRequest::builder()
            .method("POST")
            .uri("/generate")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
