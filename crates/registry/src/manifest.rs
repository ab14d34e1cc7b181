//! Build-time manifest parsing and the built-in demo manifest.

use console_core::types::{Manifest, ManifestEntry};
use console_core::{ConsoleError, ConsoleResult};

/// Parse a manifest from its JSON form.
pub fn from_json(raw: &str) -> ConsoleResult<Manifest> {
    let manifest: Manifest = serde_json::from_str(raw)?;
    Ok(manifest)
}

/// Reject manifests that declare the same module id twice. A duplicate id
/// would let a later descriptor silently shadow an earlier one, so this is
/// fatal at shell start-up.
pub fn validate(manifest: &Manifest) -> ConsoleResult<()> {
    let mut seen = std::collections::HashSet::new();
    for entry in &manifest.modules {
        if !seen.insert(entry.id.as_str()) {
            return Err(ConsoleError::ManifestConflict(format!(
                "duplicate module id '{}'",
                entry.id
            )));
        }
    }
    Ok(())
}

/// The manifest compiled into the demo shell.
pub fn builtin() -> Manifest {
    let entry = |id: &str, name: &str, cap: &str, version: &str, deps: &[&str]| ManifestEntry {
        id: id.to_string(),
        display_name: name.to_string(),
        required_capability: cap.to_string(),
        version: version.to_string(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
    };

    Manifest {
        modules: vec![
            entry("dashboard", "Dashboard", "dashboard", "2.4.0", &[]),
            entry("users", "User Management", "users", "2.1.3", &[]),
            entry("moderation", "Content Moderation", "content", "1.9.0", &["users"]),
            entry("polls", "Polls & Elections", "polls", "1.4.2", &["users"]),
            entry("analytics", "Analytics", "analytics", "3.0.1", &["dashboard"]),
            entry("billing", "Billing & Finance", "billing", "1.2.0", &["users"]),
            entry("settings", "System Settings", "settings", "2.0.0", &[]),
            entry("audit-viewer", "Audit Trail", "settings", "1.1.0", &[]),
            entry("legacy", "Legacy Reports", "analytics", "0.9.7", &["analytics"]),
        ],
    }
}
