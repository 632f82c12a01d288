//! Scope (permission) registry and set algebra
//!
//! A scope is a string token such as `recipes:write`. Keys carry a set of
//! scopes; route guards require some of them with ANY or ALL semantics.
//! Comparison is case-insensitive throughout.

use once_cell::sync::Lazy;
use serde::Serialize;

/// A scope definition exposed for discovery
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

/// All scopes a key may be granted. Create/update requests referencing a
/// token outside this list are rejected.
pub static AVAILABLE_SCOPES: Lazy<Vec<Scope>> = Lazy::new(|| {
    vec![
        scope("read", "Read access to resources", "basic"),
        scope("write", "Write access to resources", "basic"),
        scope("delete", "Delete access to resources", "basic"),
        scope("admin", "Administrative access", "advanced"),
        scope("admin:all", "Full administrative access", "advanced"),
        scope("users:read", "Read user data", "users"),
        scope("users:write", "Modify user data", "users"),
        scope("meals:read", "Read meal data", "meals"),
        scope("meals:write", "Modify meal data", "meals"),
        scope("workouts:read", "Read workout data", "workouts"),
        scope("workouts:write", "Modify workout data", "workouts"),
        scope("health:read", "Read health data", "health"),
        scope("health:write", "Modify health data", "health"),
        scope("recipes:read", "Read recipe data", "recipes"),
        scope("recipes:write", "Modify recipe data", "recipes"),
        scope("nutrition:generate", "Generate nutrition plans", "generation"),
        scope("workout:generate", "Generate workout plans", "generation"),
        scope("health:generate", "Generate health plans", "generation"),
        scope("recipe:generate", "Generate recipes", "generation"),
    ]
});

fn scope(name: &'static str, description: &'static str, category: &'static str) -> Scope {
    Scope {
        name,
        description,
        category,
    }
}

/// Check whether a scope token is part of the registry
pub fn is_known_scope(token: &str) -> bool {
    AVAILABLE_SCOPES
        .iter()
        .any(|s| s.name.eq_ignore_ascii_case(token))
}

/// True if the granted set contains at least one of the required scopes.
/// An empty required set always authorizes.
pub fn has_any_scope(granted: &[String], required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }

    required.iter().any(|r| {
        granted.iter().any(|g| g.eq_ignore_ascii_case(r))
    })
}

/// True if the granted set contains every required scope.
/// An empty required set always authorizes.
pub fn has_all_scopes(granted: &[String], required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    if granted.is_empty() {
        return false;
    }

    required.iter().all(|r| {
        granted.iter().any(|g| g.eq_ignore_ascii_case(r))
    })
}
