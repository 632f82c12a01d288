//! Caller identity and plan tiers
//!
//! An identity is the request-scoped reference used as the key for rate and
//! quota accounting. It is never persisted: authenticated callers are keyed
//! by their token subject, anonymous callers by a long-lived opaque cookie.

use serde::{Deserialize, Serialize};

/// Resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Authenticated user, from a valid bearer token subject
    User(String),
    /// Anonymous browser, from the persistent `anon_id` cookie
    Anonymous(String),
}

impl Identity {
    /// The accounting key: `user:<subject>` or `anon:<id>`
    pub fn as_key(&self) -> String {
        match self {
            Self::User(subject) => format!("user:{}", subject),
            Self::Anonymous(id) => format!("anon:{}", id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// Subscription plan tier determining the monthly quota ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Lifetime,
}

/// Monthly limit for the free tier
pub const FREE_MONTHLY_LIMIT: u32 = 3;
/// Monthly limit for the free tier with the shared bonus
pub const FREE_SHARED_MONTHLY_LIMIT: u32 = 11;
/// Monthly limit for the pro tier
pub const PRO_MONTHLY_LIMIT: u32 = 50;
/// Effectively unlimited
pub const LIFETIME_MONTHLY_LIMIT: u32 = 1_000_000;

impl Plan {
    /// Parse a plan cookie value. Case-insensitive; anything unrecognized
    /// falls back to `Free`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pro" => Self::Pro,
            "lifetime" => Self::Lifetime,
            _ => Self::Free,
        }
    }

    /// Monthly quota for this plan. The shared bonus applies to the free
    /// tier only.
    pub fn monthly_limit(&self, shared_bonus: bool) -> u32 {
        match self {
            Self::Pro => PRO_MONTHLY_LIMIT,
            Self::Lifetime => LIFETIME_MONTHLY_LIMIT,
            Self::Free => {
                if shared_bonus {
                    FREE_SHARED_MONTHLY_LIMIT
                } else {
                    FREE_MONTHLY_LIMIT
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Lifetime => "lifetime",
        }
    }
}

/// Parse a `shared` cookie value into the bonus flag. Only `yes` and
/// `true` (case-insensitive) grant the bonus.
pub fn parse_shared_bonus(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keys() {
        let user = Identity::User("42".to_string());
        let anon = Identity::Anonymous("abc-def".to_string());

        assert_eq!(user.as_key(), "user:42");
        assert_eq!(anon.as_key(), "anon:abc-def");
        assert!(user.is_authenticated());
        assert!(!anon.is_authenticated());
    }

    #[test]
    fn test_plan_parse() {
        assert_eq!(Plan::parse("pro"), Plan::Pro);
        assert_eq!(Plan::parse("PRO"), Plan::Pro);
        assert_eq!(Plan::parse(" lifetime "), Plan::Lifetime);
        assert_eq!(Plan::parse("free"), Plan::Free);
        assert_eq!(Plan::parse("enterprise"), Plan::Free);
        assert_eq!(Plan::parse(""), Plan::Free);
    }

    #[test]
    fn test_monthly_limits() {
        assert_eq!(Plan::Free.monthly_limit(false), 3);
        assert_eq!(Plan::Free.monthly_limit(true), 11);
        assert_eq!(Plan::Pro.monthly_limit(false), 50);
        // Shared bonus only changes the free tier
        assert_eq!(Plan::Pro.monthly_limit(true), 50);
        assert_eq!(Plan::Lifetime.monthly_limit(true), 1_000_000);
    }

    #[test]
    fn test_shared_bonus_parsing() {
        assert!(parse_shared_bonus("yes"));
        assert!(parse_shared_bonus("YES"));
        assert!(parse_shared_bonus("true"));
        assert!(parse_shared_bonus(" True "));
        assert!(!parse_shared_bonus("no"));
        assert!(!parse_shared_bonus("1"));
        assert!(!parse_shared_bonus(""));
    }
}
