//! Scoped-record operations: insert, fetch, and detach.
//!
//! Detach clears the foreign key and stamps the association history in
//! the same transaction, so the prior coach loses access atomically with
//! the change.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use tether_core::errors::TetherResult;
use tether_core::models::{EngagementId, PrincipalId, RecordId, ScopedRecord};

use super::directory_ops::parse_ts;
use crate::to_storage_err;

/// Insert a record. When scoped, an association-history row is opened.
pub fn insert_record(conn: &Connection, record: &ScopedRecord) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO scoped_records (record_id, company_id, module, coaching_engagement_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id.0,
            record.company_id.0,
            record.module.0,
            record.engagement_id.as_ref().map(|e| e.0.as_str()),
            record.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    if let Some(engagement_id) = &record.engagement_id {
        open_history(conn, &record.id, engagement_id)?;
    }
    Ok(())
}

/// Fetch a record's authorization-relevant view. Always reflects the
/// current row; decisions never use a cached engagement id.
pub fn get_record(conn: &Connection, id: &RecordId) -> TetherResult<Option<ScopedRecord>> {
    let row = conn
        .query_row(
            "SELECT record_id, company_id, module, coaching_engagement_id, created_at
             FROM scoped_records WHERE record_id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let Some((rid, company, module, engagement, created_at)) = row else {
        return Ok(None);
    };
    Ok(Some(ScopedRecord {
        id: RecordId(rid),
        company_id: company.into(),
        module: module.into(),
        engagement_id: engagement.map(EngagementId),
        created_at: parse_ts(&created_at)?,
    }))
}

/// Clear a record's engagement scope and stamp the history row, in one
/// transaction. Returns the engagement the record was detached from, or
/// `None` when the record was already internal.
pub fn detach_record(
    conn: &Connection,
    record_id: &RecordId,
    detached_by: &PrincipalId,
) -> TetherResult<Option<EngagementId>> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| to_storage_err(e.to_string()))?;

    let result = (|| {
        let prior: Option<String> = conn
            .query_row(
                "SELECT coaching_engagement_id FROM scoped_records WHERE record_id = ?1",
                params![record_id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| to_storage_err(e.to_string()))?
            .flatten();

        let Some(prior) = prior else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE scoped_records SET coaching_engagement_id = NULL WHERE record_id = ?1",
            params![record_id.0],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

        conn.execute(
            "UPDATE record_engagement_history
             SET detached_at = ?1, detached_by = ?2
             WHERE record_id = ?3 AND engagement_id = ?4 AND detached_at IS NULL",
            params![
                Utc::now().to_rfc3339(),
                detached_by.0,
                record_id.0,
                prior,
            ],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

        Ok(Some(EngagementId(prior)))
    })();

    match &result {
        Ok(_) => conn
            .execute_batch("COMMIT")
            .map_err(|e| to_storage_err(e.to_string()))?,
        Err(_) => {
            // Best-effort rollback; the original error is what matters.
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
    result
}

/// Record ids currently scoped to an engagement.
pub fn records_for_engagement(
    conn: &Connection,
    engagement_id: &EngagementId,
) -> TetherResult<Vec<RecordId>> {
    let mut stmt = conn
        .prepare("SELECT record_id FROM scoped_records WHERE coaching_engagement_id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![engagement_id.0], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(RecordId(row.map_err(|e| to_storage_err(e.to_string()))?));
    }
    Ok(ids)
}

/// One row of the append-only association history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub record_id: RecordId,
    pub engagement_id: EngagementId,
    pub attached_at: String,
    pub detached_at: Option<String>,
    pub detached_by: Option<PrincipalId>,
}

/// Association history for a record, oldest first.
pub fn history_for_record(
    conn: &Connection,
    record_id: &RecordId,
) -> TetherResult<Vec<HistoryRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT record_id, engagement_id, attached_at, detached_at, detached_by
             FROM record_engagement_history WHERE record_id = ?1 ORDER BY id",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![record_id.0], |row| {
            Ok(HistoryRow {
                record_id: RecordId(row.get(0)?),
                engagement_id: EngagementId(row.get(1)?),
                attached_at: row.get(2)?,
                detached_at: row.get(3)?,
                detached_by: row.get::<_, Option<String>>(4)?.map(PrincipalId),
            })
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

fn open_history(
    conn: &Connection,
    record_id: &RecordId,
    engagement_id: &EngagementId,
) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO record_engagement_history (record_id, engagement_id, attached_at)
         VALUES (?1, ?2, ?3)",
        params![record_id.0, engagement_id.0, Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
