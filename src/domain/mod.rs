//! Domain layer: entities, repository traits, and core errors

pub mod admission;
pub mod api_key;
pub mod error;
pub mod identity;
pub mod usage;

pub use admission::{AdmissionError, AdmissionPhase, QuotaDecision, RateDecision, RateScope};
pub use api_key::{ApiKey, ApiKeyRepository};
pub use error::DomainError;
pub use identity::{Identity, Plan};
pub use usage::{UsageRecord, UsageRepository};
