//! The elevated access path for site administrators.
//!
//! Site admins resolve to an empty scope through the normal path; the
//! only way they touch tenant data is through this module, which audits
//! every use before returning an allow. Elevated access is never the
//! default route for anything.

use rusqlite::Connection;
use tracing::warn;

use tether_core::errors::{TetherError, TetherResult};
use tether_core::models::{
    Action, AuditActor, AuditEntry, AuditKind, Decision, PrincipalId, RecordId, ScopedRecord,
};

use tether_storage::audit;
use tether_storage::queries::{directory_ops, record_ops};

/// Decide an action on a record via the elevated path. The caller must be
/// a site admin; every call, allowed or not, is its own audit entry.
pub fn elevated_decide(
    conn: &Connection,
    actor: &PrincipalId,
    action: Action,
    record_id: &RecordId,
    justification: &str,
) -> TetherResult<Decision> {
    if !directory_ops::is_site_admin(conn, actor)? {
        return Err(TetherError::Forbidden {
            actor: actor.to_string(),
            reason: "elevated access requires site_admin".into(),
        });
    }

    let record = record_ops::get_record(conn, record_id)?
        .ok_or_else(|| TetherError::RecordNotFound { id: record_id.clone() })?;

    audit_elevated(conn, actor, action, &record, justification);

    warn!(
        actor = %actor,
        record = %record_id,
        action = %action,
        "elevated access used"
    );
    Ok(Decision::allow())
}

fn audit_elevated(
    conn: &Connection,
    actor: &PrincipalId,
    action: Action,
    record: &ScopedRecord,
    justification: &str,
) {
    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::ElevatedAccess,
        "record",
        record.id.as_str(),
    )
    .with_details(serde_json::json!({
        "action": action.to_string(),
        "module": record.module.as_str(),
        "company": record.company_id.as_str(),
        "justification": justification,
    }));
    audit::record_or_report(conn, &entry);
}
