//! Admission domain types
//!
//! A request moves through a fixed, linear chain of gates. Each gate either
//! advances the phase or terminates the request with one of the failure
//! outcomes; no gate is ever retried within a single request.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::identity::Plan;

/// Phases of the admission state machine, in order. Terminal failures are
/// carried by [`AdmissionError`] rather than phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AdmissionPhase {
    Unchecked,
    IpChecked,
    IdentityResolved,
    RateChecked,
    QuotaChecked,
    KeyAuthenticated,
    ScopeAuthorized,
    Admitted,
}

impl AdmissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::IpChecked => "ip_checked",
            Self::IdentityResolved => "identity_resolved",
            Self::RateChecked => "rate_checked",
            Self::QuotaChecked => "quota_checked",
            Self::KeyAuthenticated => "key_authenticated",
            Self::ScopeAuthorized => "scope_authorized",
            Self::Admitted => "admitted",
        }
    }
}

impl std::fmt::Display for AdmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which rate gate produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    /// Gate A: per source IP
    Ip,
    /// Gate B: per resolved identity
    Identity,
}

impl std::fmt::Display for RateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => write!(f, "ip"),
            Self::Identity => write!(f, "identity"),
        }
    }
}

/// Result of a token-bucket check
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// Suggested wait before retrying, in whole seconds (>= 1 on rejection)
    pub retry_after_secs: u64,
}

impl RateDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    pub fn rejected(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: retry_after_secs.max(1),
        }
    }
}

/// Result of a monthly-quota check
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Requests consumed this month, including this one when admitted
    pub used: u32,
    pub limit: u32,
    pub plan: Plan,
    /// When the quota window rolls over (start of next month, UTC)
    pub resets: DateTime<Utc>,
}

/// Terminal admission failures
#[derive(Debug, Clone, Error)]
pub enum AdmissionError {
    #[error("{scope} rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        scope: RateScope,
        retry_after_secs: u64,
    },

    #[error("monthly quota exceeded: {}/{} ({})", .used, .limit, .plan.as_str())]
    QuotaExceeded {
        used: u32,
        limit: u32,
        plan: Plan,
        resets: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(AdmissionPhase::Unchecked < AdmissionPhase::IpChecked);
        assert!(AdmissionPhase::IpChecked < AdmissionPhase::IdentityResolved);
        assert!(AdmissionPhase::IdentityResolved < AdmissionPhase::RateChecked);
        assert!(AdmissionPhase::RateChecked < AdmissionPhase::QuotaChecked);
        assert!(AdmissionPhase::QuotaChecked < AdmissionPhase::KeyAuthenticated);
        assert!(AdmissionPhase::KeyAuthenticated < AdmissionPhase::ScopeAuthorized);
        assert!(AdmissionPhase::ScopeAuthorized < AdmissionPhase::Admitted);
    }

    #[test]
    fn test_rate_decision_rejection_floor() {
        // A rejection always suggests at least one second of backoff
        let decision = RateDecision::rejected(0);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[test]
    fn test_admission_error_display() {
        let err = AdmissionError::RateLimited {
            scope: RateScope::Ip,
            retry_after_secs: 2,
        };
        assert_eq!(err.to_string(), "ip rate limit exceeded, retry after 2s");

        let err = AdmissionError::QuotaExceeded {
            used: 3,
            limit: 3,
            plan: Plan::Free,
            resets: Utc::now(),
        };
        assert!(err.to_string().contains("3/3"));
        assert!(err.to_string().contains("free"));
    }
}
