//! Identity resolution
//!
//! Derives the rate/quota accounting identity for a request. A valid bearer
//! token wins; otherwise the persistent `anon_id` cookie is used, minted on
//! first sighting. The resolved identity carries no PII, only the token
//! subject or an opaque random id.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use cookie::{Cookie, SameSite};
use uuid::Uuid;

use crate::domain::identity::{parse_shared_bonus, Identity, Plan};
use crate::infrastructure::auth::JwtService;

const ANON_COOKIE: &str = "anon_id";
const PLAN_COOKIE: &str = "plan";
const SHARED_COOKIE: &str = "shared";

/// Outcome of identity resolution for one request
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub plan: Plan,
    pub shared_bonus: bool,
    /// `Set-Cookie` value to attach when a new anonymous id was minted
    pub set_cookie: Option<String>,
}

/// Resolves caller identities from request headers
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    jwt_service: Arc<JwtService>,
    cookie_max_age_days: i64,
}

impl IdentityResolver {
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self {
            jwt_service,
            cookie_max_age_days: 365,
        }
    }

    pub fn with_cookie_max_age_days(mut self, days: i64) -> Self {
        self.cookie_max_age_days = days;
        self
    }

    /// Resolve the identity for a request. Deterministic for the same
    /// browser across calls: the same token subject or the same cookie
    /// always produces the same identity.
    pub fn resolve(&self, headers: &HeaderMap) -> ResolvedIdentity {
        let plan = read_cookie(headers, PLAN_COOKIE)
            .map(|v| Plan::parse(&v))
            .unwrap_or_default();
        let shared_bonus = read_cookie(headers, SHARED_COOKIE)
            .map(|v| parse_shared_bonus(&v))
            .unwrap_or(false);

        if let Some(subject) = self.bearer_subject(headers) {
            return ResolvedIdentity {
                identity: Identity::User(subject),
                plan,
                shared_bonus,
                set_cookie: None,
            };
        }

        match read_cookie(headers, ANON_COOKIE) {
            Some(anon_id) => ResolvedIdentity {
                identity: Identity::Anonymous(anon_id),
                plan,
                shared_bonus,
                set_cookie: None,
            },
            None => {
                let anon_id = Uuid::new_v4().to_string();
                let set_cookie = self.build_anon_cookie(&anon_id);

                ResolvedIdentity {
                    identity: Identity::Anonymous(anon_id),
                    plan,
                    shared_bonus,
                    set_cookie: Some(set_cookie),
                }
            }
        }
    }

    /// Subject from a valid bearer token, if present
    fn bearer_subject(&self, headers: &HeaderMap) -> Option<String> {
        let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

        let scheme = auth.get(..7)?;
        if !scheme.eq_ignore_ascii_case("bearer ") {
            return None;
        }

        let token = auth[7..].trim();
        let claims = self.jwt_service.validate(token).ok()?;

        let subject = claims.subject().trim();
        if subject.is_empty() {
            None
        } else {
            Some(subject.to_string())
        }
    }

    fn build_anon_cookie(&self, anon_id: &str) -> String {
        Cookie::build((ANON_COOKIE, anon_id))
            .path("/")
            .max_age(cookie::time::Duration::days(self.cookie_max_age_days))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Lax)
            .build()
            .to_string()
    }
}

/// Read one cookie value from the `Cookie` header; empty values count as
/// absent.
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie in Cookie::split_parse(raw).flatten() {
        if cookie.name() == name {
            let value = cookie.value().trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}
