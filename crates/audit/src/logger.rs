use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use console_core::types::AuditEntry;

use crate::sink::AuditSink;

/// Query filter for the audit trail.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub module_id: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            actor_id: None,
            module_id: None,
            action: None,
            from: None,
            to: None,
            limit: 100,
        }
    }
}

/// Append-only audit log with hash chaining and a bounded sink-retry buffer.
pub struct AuditLog {
    entries: DashMap<Uuid, AuditEntry>,
    sequence: Mutex<u64>,
    last_hash: Mutex<String>,
    sink: Arc<dyn AuditSink>,
    pending: Mutex<VecDeque<AuditEntry>>,
    buffer_capacity: usize,
    dropped: AtomicU64,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>, buffer_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            sequence: Mutex::new(0),
            last_hash: Mutex::new("genesis".to_string()),
            sink,
            pending: Mutex::new(VecDeque::new()),
            buffer_capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append one entry. The entry is sequence-stamped, chained to its
    /// predecessor, and forwarded to the sink. A sink failure buffers the
    /// entry for retry; when the buffer is full the oldest buffered entry
    /// is dropped (bounded, documented loss).
    pub fn append(
        &self,
        actor_id: Uuid,
        module_id: impl Into<String>,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> AuditEntry {
        let entry = self.chain(AuditEntry::new(actor_id, module_id, action, detail));
        self.entries.insert(entry.id, entry.clone());

        if let Err(e) = self.sink.write(&entry) {
            warn!(entry_id = %entry.id, error = %e, "audit sink write failed, buffering entry");
            let mut pending = self.pending.lock();
            if pending.len() >= self.buffer_capacity {
                pending.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_total = dropped, "audit retry buffer full, dropped oldest entry");
            }
            pending.push_back(entry.clone());
        }
        entry
    }

    /// Retry buffered entries in order, stopping at the first failure so
    /// ordering into the sink is preserved. Returns the number flushed.
    pub fn flush_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut flushed = 0;
        while let Some(entry) = pending.front() {
            match self.sink.write(entry) {
                Ok(()) => {
                    pending.pop_front();
                    flushed += 1;
                }
                Err(_) => break,
            }
        }
        if flushed > 0 {
            info!(flushed, remaining = pending.len(), "flushed buffered audit entries");
        }
        flushed
    }

    /// Background timer driving [`flush_pending`](Self::flush_pending),
    /// independent of the actions that produced the entries.
    pub fn spawn_retry_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let log = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                log.flush_pending();
            }
        })
    }

    /// Entries currently awaiting sink retry.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Entries lost to buffer exhaustion since start-up.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Query committed entries, newest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let mut results: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|e| {
                let entry = e.value();
                if let Some(actor) = filter.actor_id {
                    if entry.actor_id != actor {
                        return false;
                    }
                }
                if let Some(ref module) = filter.module_id {
                    if &entry.module_id != module {
                        return false;
                    }
                }
                if let Some(ref action) = filter.action {
                    if &entry.action != action {
                        return false;
                    }
                }
                if let Some(from) = filter.from {
                    if entry.timestamp < from {
                        return false;
                    }
                }
                if let Some(to) = filter.to {
                    if entry.timestamp > to {
                        return false;
                    }
                }
                true
            })
            .map(|e| e.value().clone())
            .collect();

        results.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        results.truncate(filter.limit);
        results
    }

    /// Total committed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assign sequence, link to the previous hash, and compute this entry's
    /// hash over its stable fields.
    fn chain(&self, mut entry: AuditEntry) -> AuditEntry {
        let mut seq = self.sequence.lock();
        *seq += 1;
        entry.sequence = *seq;

        let mut prev = self.last_hash.lock();
        entry.previous_hash = prev.clone();
        entry.entry_hash = hash_entry(&entry);
        *prev = entry.entry_hash.clone();
        entry
    }

    /// Recompute the whole chain and report any tampered sequences.
    pub fn verify_chain(&self) -> ChainVerification {
        let mut entries: Vec<AuditEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.sequence);

        let total = entries.len();
        let mut valid = 0;
        let mut tampered = Vec::new();
        let mut expected_prev = "genesis".to_string();

        for entry in &entries {
            if entry.previous_hash != expected_prev || hash_entry(entry) != entry.entry_hash {
                tampered.push(entry.sequence);
            } else {
                valid += 1;
            }
            expected_prev = entry.entry_hash.clone();
        }

        ChainVerification {
            total_entries: total,
            valid_entries: valid,
            tampered_sequences: tampered,
            chain_intact: valid == total,
        }
    }
}

/// Result of verifying the audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub tampered_sequences: Vec<u64>,
    pub chain_intact: bool,
}

fn hash_entry(entry: &AuditEntry) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}",
        entry.sequence,
        entry.actor_id,
        entry.module_id,
        entry.action,
        entry.timestamp.to_rfc3339(),
        entry.previous_hash,
    );
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use console_core::{ConsoleError, ConsoleResult};
    use std::sync::atomic::AtomicBool;

    /// Sink whose availability can be toggled mid-test.
    struct FlakySink {
        inner: MemorySink,
        down: AtomicBool,
    }

    impl FlakySink {
        fn new(down: bool) -> Self {
            Self {
                inner: MemorySink::new(),
                down: AtomicBool::new(down),
            }
        }
    }

    impl AuditSink for FlakySink {
        fn write(&self, entry: &AuditEntry) -> ConsoleResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ConsoleError::AuditSink("store offline".into()));
            }
            self.inner.write(entry)
        }
    }

    fn log_with_memory_sink() -> AuditLog {
        AuditLog::new(Arc::new(MemorySink::new()), 8)
    }

    #[test]
    fn test_append_and_query_filters() {
        let log = log_with_memory_sink();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        log.append(alice, "users", "navigated", serde_json::json!({}));
        log.append(alice, "billing", "denied", serde_json::json!({"required": "billing"}));
        log.append(bob, "users", "navigated", serde_json::json!({}));

        let by_actor = log.query(&AuditFilter {
            actor_id: Some(alice),
            ..Default::default()
        });
        assert_eq!(by_actor.len(), 2);

        let denials = log.query(&AuditFilter {
            action: Some("denied".into()),
            ..Default::default()
        });
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].module_id, "billing");

        // Newest first.
        let all = log.query(&AuditFilter::default());
        assert_eq!(all[0].sequence, 3);
    }

    #[test]
    fn test_sink_outage_buffers_then_flushes() {
        let sink = Arc::new(FlakySink::new(true));
        let log = AuditLog::new(sink.clone(), 8);
        let actor = Uuid::new_v4();

        log.append(actor, "users", "navigated", serde_json::json!({}));
        log.append(actor, "polls", "navigated", serde_json::json!({}));
        assert_eq!(log.pending_len(), 2);
        assert_eq!(sink.inner.len(), 0);
        // Entries are still committed locally for query.
        assert_eq!(log.len(), 2);

        // Sink still down: nothing flushes.
        assert_eq!(log.flush_pending(), 0);

        sink.down.store(false, Ordering::SeqCst);
        assert_eq!(log.flush_pending(), 2);
        assert_eq!(log.pending_len(), 0);
        assert_eq!(sink.inner.len(), 2);
    }

    #[test]
    fn test_buffer_bounded_drops_oldest() {
        let sink = Arc::new(FlakySink::new(true));
        let log = AuditLog::new(sink.clone(), 2);
        let actor = Uuid::new_v4();

        log.append(actor, "a", "act", serde_json::json!({}));
        log.append(actor, "b", "act", serde_json::json!({}));
        log.append(actor, "c", "act", serde_json::json!({}));

        assert_eq!(log.pending_len(), 2);
        assert_eq!(log.dropped_count(), 1);

        sink.down.store(false, Ordering::SeqCst);
        log.flush_pending();
        // The oldest buffered entry ("a") was dropped from the retry buffer.
        assert_eq!(sink.inner.len(), 2);
    }

    #[test]
    fn test_chain_verification() {
        let log = log_with_memory_sink();
        let actor = Uuid::new_v4();
        for i in 0..5 {
            log.append(actor, "users", format!("action_{i}"), serde_json::json!({}));
        }

        let verification = log.verify_chain();
        assert_eq!(verification.total_entries, 5);
        assert_eq!(verification.valid_entries, 5);
        assert!(verification.chain_intact);
        assert!(verification.tampered_sequences.is_empty());
    }
}
