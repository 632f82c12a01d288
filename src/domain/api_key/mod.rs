//! API Key domain: entity, repository trait, scope registry

mod entity;
mod repository;
pub mod scopes;

pub use entity::ApiKey;
pub use repository::{ApiKeyPage, ApiKeyRepository, ListApiKeysParams};
pub use scopes::{has_all_scopes, has_any_scope, is_known_scope, Scope, AVAILABLE_SCOPES};
