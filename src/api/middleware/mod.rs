//! Request middleware: admission gates, authentication, scopes, telemetry

pub mod admission;
pub mod auth;
pub mod scopes;
pub mod usage;

pub use admission::{identity_gate, ip_gate, quota_gate, resolve_identity};
pub use auth::{extract_api_key, RequireApiKey, API_KEY_HEADER};
pub use scopes::{enforce_all, enforce_any};
pub use usage::record_usage;
