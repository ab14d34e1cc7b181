use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use console_core::types::{Manifest, ModuleDescriptor, ModuleStatus};
use console_core::{ConsoleError, ConsoleResult};

use crate::manifest;

/// Ordered catalog of module descriptors. Insertion order is preserved for
/// stable menu ordering; the id index enforces uniqueness.
pub struct ModuleRegistry {
    inner: RwLock<Inner>,
}

struct Inner {
    modules: Vec<ModuleDescriptor>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    /// Seed the registry from a build-time manifest. Fails on duplicate
    /// module ids — the shell must not start with a conflicting catalog.
    pub fn from_manifest(manifest: Manifest) -> ConsoleResult<Self> {
        manifest::validate(&manifest)?;

        let mut modules = Vec::with_capacity(manifest.modules.len());
        let mut index = HashMap::with_capacity(manifest.modules.len());
        for entry in manifest.modules {
            index.insert(entry.id.clone(), modules.len());
            modules.push(ModuleDescriptor {
                id: entry.id,
                display_name: entry.display_name,
                required_capability: entry.required_capability,
                status: ModuleStatus::Active,
                version: entry.version,
                dependencies: entry.dependencies,
                last_synced_at: None,
            });
        }

        info!(modules = modules.len(), "module registry seeded from manifest");
        Ok(Self {
            inner: RwLock::new(Inner { modules, index }),
        })
    }

    /// Registry seeded from the built-in demo manifest.
    pub fn builtin() -> Self {
        // The built-in manifest is validated by its own test; a duplicate id
        // here is a programming error.
        Self::from_manifest(manifest::builtin()).expect("built-in manifest is conflict-free")
    }

    /// All descriptors in manifest insertion order.
    pub fn list(&self) -> Vec<ModuleDescriptor> {
        self.inner.read().modules.clone()
    }

    /// Look up one descriptor by id.
    pub fn get(&self, id: &str) -> Option<ModuleDescriptor> {
        let inner = self.inner.read();
        inner.index.get(id).map(|&i| inner.modules[i].clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().modules.is_empty()
    }

    /// The only mutator. Called exclusively by the reconciliation engine;
    /// stamps `last_synced_at` alongside the status.
    pub fn update_status(
        &self,
        id: &str,
        status: ModuleStatus,
        observed_at: DateTime<Utc>,
    ) -> ConsoleResult<()> {
        let mut inner = self.inner.write();
        let i = *inner
            .index
            .get(id)
            .ok_or_else(|| ConsoleError::ModuleNotFound(id.to_string()))?;
        let module = &mut inner.modules[i];
        if module.status != status {
            info!(
                module_id = %id,
                from = ?module.status,
                to = ?status,
                "module status updated"
            );
        }
        module.status = status;
        module.last_synced_at = Some(observed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_core::types::ManifestEntry;

    fn manifest_of(ids: &[&str]) -> Manifest {
        Manifest {
            modules: ids
                .iter()
                .map(|id| ManifestEntry {
                    id: id.to_string(),
                    display_name: id.to_uppercase(),
                    required_capability: id.to_string(),
                    version: "1.0.0".to_string(),
                    dependencies: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = ModuleRegistry::from_manifest(manifest_of(&["zeta", "alpha", "mid"])).unwrap();
        let ids: Vec<_> = registry.list().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_manifest_fatal() {
        let err = ModuleRegistry::from_manifest(manifest_of(&["polls", "users", "polls"]))
            .err()
            .expect("duplicate id must fail start-up");
        assert!(matches!(err, ConsoleError::ManifestConflict(_)));
    }

    #[test]
    fn test_get_and_update_status() {
        let registry = ModuleRegistry::from_manifest(manifest_of(&["users"])).unwrap();
        assert_eq!(registry.get("users").unwrap().status, ModuleStatus::Active);
        assert!(registry.get("ghost").is_none());

        let now = Utc::now();
        registry
            .update_status("users", ModuleStatus::Broken, now)
            .unwrap();
        let users = registry.get("users").unwrap();
        assert_eq!(users.status, ModuleStatus::Broken);
        assert_eq!(users.last_synced_at, Some(now));

        assert!(registry
            .update_status("ghost", ModuleStatus::Active, now)
            .is_err());
    }
}
