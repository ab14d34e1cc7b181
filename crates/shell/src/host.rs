//! Opaque module handles and the per-module capability object.
//!
//! The core never branches on module identity: it checks capability and
//! existence, then hands control to whatever implementation is registered
//! against the id.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use console_audit::AuditLog;
use console_core::types::{Actor, CapabilitySet};

/// Boxed instantiation-check future. `async fn` in traits is not object
/// safe, and the host stores modules as trait objects.
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// An independently built management module, seen by the core as an opaque
/// handle: a stable id plus an instantiation check.
pub trait ConsoleModule: Send + Sync {
    /// Stable module id matching the manifest entry.
    fn id(&self) -> &str;

    /// Check that the module can be instantiated. Used by reconciliation;
    /// an error marks the module broken, never aborts the pass.
    fn probe(&self) -> ProbeFuture<'_>;
}

/// The set of modules actually compiled into the running shell.
#[derive(Default)]
pub struct ModuleHost {
    modules: DashMap<String, Arc<dyn ConsoleModule>>,
}

impl ModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module: Arc<dyn ConsoleModule>) {
        self.modules.insert(module.id().to_string(), module);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ConsoleModule>> {
        self.modules.get(id).map(|m| Arc::clone(m.value()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// The only surface a mounted module receives. Modules never read the
/// registry or the capability set directly.
pub struct ModuleContext {
    actor_id: Uuid,
    module_id: String,
    capabilities: CapabilitySet,
    audit: Arc<AuditLog>,
}

impl ModuleContext {
    pub fn new(actor: &Actor, capabilities: CapabilitySet, module_id: String, audit: Arc<AuditLog>) -> Self {
        Self {
            actor_id: actor.id,
            module_id,
            capabilities,
            audit,
        }
    }

    /// Consult the actor's session capabilities.
    pub fn is_allowed(&self, capability: &str) -> bool {
        self.capabilities.allows(capability)
    }

    /// Record a completed module action in the audit trail.
    pub fn log_activity(&self, action: &str, detail: serde_json::Value) {
        self.audit.append(self.actor_id, self.module_id.clone(), action, detail);
    }
}

/// A handle that always instantiates; used by the demo shell and tests.
pub struct StubModule {
    id: String,
}

impl StubModule {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { id: id.into() })
    }
}

impl ConsoleModule for StubModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// A handle whose instantiation always fails; used to exercise the
/// broken-module path.
pub struct FailingModule {
    id: String,
    reason: String,
}

impl FailingModule {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            reason: reason.into(),
        })
    }
}

impl ConsoleModule for FailingModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async { Err(anyhow::anyhow!("{}", self.reason)) })
    }
}
