//! Append-only audit trail with tamper-evident hash chaining, a pluggable
//! sink, and a bounded retry buffer for sink outages. Appending is
//! fire-and-forget for callers: a sink failure is buffered and retried on a
//! background timer, never surfaced to the triggering action.

mod logger;
mod sink;

pub use logger::{AuditFilter, AuditLog, ChainVerification};
pub use sink::{AuditSink, MemorySink};
