//! Append and read the audit log.

use rusqlite::{params, Connection};

use tether_core::errors::TetherResult;
use tether_core::models::{AuditActor, AuditEntry, AuditKind};

use super::directory_ops::parse_ts;
use crate::to_storage_err;

/// Append one entry. Returns the assigned row id.
pub fn append(conn: &Connection, entry: &AuditEntry) -> TetherResult<i64> {
    let before = entry
        .before
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| to_storage_err(e.to_string()))?;
    let after = entry
        .after
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| to_storage_err(e.to_string()))?;
    let details = entry
        .details
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| to_storage_err(e.to_string()))?;

    conn.execute(
        "INSERT INTO audit_log
            (timestamp, actor, kind, entity_type, entity_id, before_json, after_json, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.timestamp.to_rfc3339(),
            entry.actor.storage_key(),
            entry.kind.as_str(),
            entry.entity_type,
            entry.entity_id,
            before,
            after,
            details,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Entries for one entity, oldest first.
pub fn entries_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> TetherResult<Vec<AuditEntry>> {
    query_entries(
        conn,
        "SELECT id, timestamp, actor, kind, entity_type, entity_id, before_json, after_json, details
         FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
        params![entity_type, entity_id],
    )
}

/// Entries of one kind, oldest first.
pub fn entries_of_kind(conn: &Connection, kind: AuditKind) -> TetherResult<Vec<AuditEntry>> {
    query_entries(
        conn,
        "SELECT id, timestamp, actor, kind, entity_type, entity_id, before_json, after_json, details
         FROM audit_log WHERE kind = ?1 ORDER BY id",
        params![kind.as_str()],
    )
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> TetherResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(sql).map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, ts, actor_str, kind_str, entity_type, entity_id, before, after, details) =
            row.map_err(|e| to_storage_err(e.to_string()))?;
        let actor = AuditActor::parse(&actor_str)
            .ok_or_else(|| to_storage_err(format!("unknown audit actor: {actor_str}")))?;
        let kind = AuditKind::parse(&kind_str)
            .ok_or_else(|| to_storage_err(format!("unknown audit kind: {kind_str}")))?;
        entries.push(AuditEntry {
            id,
            timestamp: parse_ts(&ts)?,
            actor,
            kind,
            entity_type,
            entity_id,
            before: parse_json_opt(before)?,
            after: parse_json_opt(after)?,
            details: parse_json_opt(details)?,
        });
    }
    Ok(entries)
}

fn parse_json_opt(s: Option<String>) -> TetherResult<Option<serde_json::Value>> {
    s.map(|s| serde_json::from_str(&s).map_err(|e| to_storage_err(format!("parse audit json: {e}"))))
        .transpose()
}
