//! Usage telemetry middleware
//!
//! Runs inside the scope/auth layers: when a validated key is present in
//! request extensions, one audit row is appended after the handler
//! completes. Recording is write-and-forget and never affects the response.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::state::AppState;
use crate::domain::admission::AdmissionPhase;
use crate::domain::api_key::ApiKey;
use crate::domain::usage::UsageRecord;

pub async fn record_usage(state: AppState, request: Request, next: Next) -> Response {
    let api_key_id = request
        .extensions()
        .get::<ApiKey>()
        .map(|key| key.id().to_string());

    if api_key_id.is_some() {
        debug!(phase = %AdmissionPhase::Admitted, "request admitted");
    }

    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let ip_address = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_default();

    let response = next.run(request).await;

    if let Some(api_key_id) = api_key_id {
        let record = UsageRecord::new(
            api_key_id,
            endpoint,
            method,
            i32::from(response.status().as_u16()),
        )
        .with_ip_address(ip_address)
        .with_user_agent(user_agent);

        state.usage_service.record(record).await;
    }

    response
}
