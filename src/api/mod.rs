//! HTTP surface: state, middleware, error envelope, admin routes

pub mod admin;
pub mod health;
pub mod middleware;
pub mod router;
pub mod state;
pub mod types;

pub use router::{apply_admission_gates, apply_quota_gate, create_router};
pub use state::AppState;
