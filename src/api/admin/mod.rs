//! Admin API surface

pub mod api_keys;

use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};

use crate::api::middleware::scopes::enforce_any;
use crate::api::middleware::usage::record_usage;
use crate::api::state::AppState;

/// Scopes that unlock the admin surface
const ADMIN_SCOPES: [&str; 2] = ["admin", "admin:all"];

/// Build the admin router. Every route requires an API key carrying an
/// admin scope; authenticated calls are recorded in the usage audit.
pub fn create_admin_router(state: AppState) -> Router<AppState> {
    let guard_state = state.clone();
    let usage_state = state;

    let guard = middleware::from_fn(move |request: Request, next: Next| {
        let state = guard_state.clone();
        let required = ADMIN_SCOPES.iter().map(|s| s.to_string()).collect();
        async move { enforce_any(state, required, request, next).await }
    });

    let usage = middleware::from_fn(move |request: Request, next: Next| {
        let state = usage_state.clone();
        async move { record_usage(state, request, next).await }
    });

    Router::new()
        .route(
            "/api-keys",
            post(api_keys::create_api_key).get(api_keys::list_api_keys),
        )
        .route(
            "/api-keys/{id}",
            get(api_keys::get_api_key)
                .put(api_keys::update_api_key)
                .delete(api_keys::delete_api_key),
        )
        .route("/api-keys/{id}/renew", post(api_keys::renew_api_key))
        .route("/api-keys/{id}/stats", get(api_keys::get_api_key_stats))
        .route("/permissions", get(api_keys::list_permissions))
        // The guard wraps the recorder: only authenticated calls are audited
        .route_layer(usage)
        .route_layer(guard)
}
