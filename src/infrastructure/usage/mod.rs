//! Usage audit infrastructure

mod in_memory;
mod postgres;
mod service;

pub use in_memory::InMemoryUsageRepository;
pub use postgres::PostgresUsageRepository;
pub use service::UsageTrackingService;
