//! Audit sink: fire-and-forget with error surfacing.
//!
//! A failed audit write must never block the operation it records, but it
//! must not be swallowed either — it is logged at error severity and
//! counted, so operators can alert on it.

use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::Connection;

use tether_core::models::AuditEntry;

use crate::queries::audit_ops;

/// Count of audit writes that failed since process start. Exposed so a
/// health endpoint (outside this crate) can surface the number.
static FAILED_AUDIT_WRITES: AtomicU64 = AtomicU64::new(0);

/// Append an entry; on failure, surface the error via `tracing::error!`
/// and a counter, and return without failing the enclosing operation.
pub fn record_or_report(conn: &Connection, entry: &AuditEntry) {
    if let Err(e) = audit_ops::append(conn, entry) {
        FAILED_AUDIT_WRITES.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            kind = entry.kind.as_str(),
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            error = %e,
            "audit write failed"
        );
    }
}

/// Number of audit writes that have failed since process start.
pub fn failed_write_count() -> u64 {
    FAILED_AUDIT_WRITES.load(Ordering::Relaxed)
}
