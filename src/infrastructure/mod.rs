//! Infrastructure layer: concrete implementations of the domain traits

pub mod admission;
pub mod api_key;
pub mod auth;
pub mod identity;
pub mod logging;
pub mod usage;
