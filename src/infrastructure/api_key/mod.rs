//! API Key infrastructure: generation, service, repositories

mod generator;
mod in_memory;
mod postgres;
mod service;

pub use generator::{constant_time_compare, ApiKeyGenerator};
pub use in_memory::InMemoryApiKeyRepository;
pub use postgres::{connect_pool, PostgresApiKeyRepository, PostgresConfig};
pub use service::{ApiKeyService, CreateApiKeyRequest, UpdateApiKeyRequest};
