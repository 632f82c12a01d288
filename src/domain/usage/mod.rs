//! Usage audit domain

mod record;
mod repository;

pub use record::{EndpointStat, UsageRecord, UsageStats};
pub use repository::UsageRepository;
