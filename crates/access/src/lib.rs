//! Permission resolver: a static role → capability table and the allow/deny
//! check gating every module access. Pure functions over fixed data; any
//! change to the table ships as a redeploy, never a runtime mutation.

use console_core::types::{CapabilitySet, Role};
use tracing::debug;

/// The static role table. Deterministic: the same role always yields the
/// same capability set.
fn table(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin | Role::SuperAdmin => &["all"],
        Role::Moderator => &["dashboard", "users", "polls", "analytics"],
        Role::Editor => &["dashboard", "content", "polls"],
        Role::User => &["dashboard"],
    }
}

/// Resolve a role to its capability set. Pure and total.
pub fn resolve(role: Role) -> CapabilitySet {
    CapabilitySet::from_tokens(table(role).iter().copied())
}

/// Resolve an untrusted role name. Unknown names yield the empty set,
/// never an error.
pub fn resolve_name(name: &str) -> CapabilitySet {
    match Role::parse(name) {
        Some(role) => resolve(role),
        None => {
            debug!(role = %name, "unknown role, resolving to empty capability set");
            CapabilitySet::empty()
        }
    }
}

/// Check a capability set against a module's required capability.
pub fn is_allowed(capabilities: &CapabilitySet, required: &str) -> bool {
    capabilities.allows(required)
}
