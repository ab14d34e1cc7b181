//! Core data model: actors, capabilities, module descriptors, audit entries,
//! and reconciliation reports.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative role held by an authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SuperAdmin,
    Moderator,
    Editor,
    User,
}

impl Role {
    /// Parse a role name. Unknown names yield `None` so callers can fall
    /// back to an empty capability set instead of erroring.
    pub fn parse(name: &str) -> Option<Role> {
        match name {
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            "moderator" => Some(Role::Moderator),
            "editor" => Some(Role::Editor),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Moderator => "moderator",
            Role::Editor => "editor",
            Role::User => "user",
        }
    }
}

/// An authenticated user of the console. Immutable for the session
/// lifetime; re-fetched on re-authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }
}

/// The wildcard capability token: satisfies any required-capability check.
pub const CAP_ALL: &str = "all";

/// Set of capability tokens derived once per session from the actor's role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// True iff the set contains `required` or the `"all"` wildcard.
    pub fn allows(&self, required: &str) -> bool {
        self.0.contains(CAP_ALL) || self.0.contains(required)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Lifecycle status of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Active,
    Inactive,
    Broken,
}

/// Catalog entry for one administrative module. Owned exclusively by the
/// registry; `status` and `last_synced_at` are the only mutable fields and
/// are updated only by the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: String,
    pub display_name: String,
    pub required_capability: String,
    pub status: ModuleStatus,
    pub version: String,
    pub dependencies: Vec<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// One append-only audit record. `sequence`, `entry_hash`, and
/// `previous_hash` are assigned by the audit log when the entry is chained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub actor_id: Uuid,
    pub module_id: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub entry_hash: String,
    pub previous_hash: String,
}

impl AuditEntry {
    pub fn new(
        actor_id: Uuid,
        module_id: impl Into<String>,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            actor_id,
            module_id: module_id.into(),
            action: action.into(),
            detail,
            timestamp: Utc::now(),
            entry_hash: String::new(),
            previous_hash: String::new(),
        }
    }
}

/// Declared-vs-observed status mismatch for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftConflict {
    pub module_id: String,
    pub declared: ModuleStatus,
    pub observed: ModuleStatus,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub id: Uuid,
    pub run_at: DateTime<Utc>,
    pub conflicts: Vec<DriftConflict>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Build-time module manifest seeding the registry at shell start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub modules: Vec<ManifestEntry>,
}

/// One declared module in the build manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub display_name: String,
    pub required_capability: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}
