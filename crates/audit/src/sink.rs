use dashmap::DashMap;
use uuid::Uuid;

use console_core::types::AuditEntry;
use console_core::ConsoleResult;

/// Destination for committed audit entries, e.g. an append-only store with
/// schema `(id, actor_id, module_id, action, detail_json, created_at)`.
/// Implementations return `ConsoleError::AuditSink` when unavailable.
pub trait AuditSink: Send + Sync {
    fn write(&self, entry: &AuditEntry) -> ConsoleResult<()>;
}

/// In-memory sink used by the demo shell and tests.
#[derive(Default)]
pub struct MemorySink {
    entries: DashMap<Uuid, AuditEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AuditSink for MemorySink {
    fn write(&self, entry: &AuditEntry) -> ConsoleResult<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }
}
