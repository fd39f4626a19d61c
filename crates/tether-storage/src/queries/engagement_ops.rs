//! Engagement CRUD, coach assignment, and the compare-and-swap status
//! update that serializes concurrent transitions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use tether_core::errors::TetherResult;
use tether_core::models::{Engagement, EngagementId, EngagementStatus, OrgId, PrincipalId};

use super::directory_ops::parse_ts;
use crate::to_storage_err;

/// Insert a new engagement and its coach assignments.
pub fn insert_engagement(conn: &Connection, engagement: &Engagement) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO engagements (engagement_id, org_id, company_id, status, linked_at, ended_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            engagement.id.0,
            engagement.org_id.0,
            engagement.company_id.0,
            engagement.status.as_str(),
            engagement.linked_at.to_rfc3339(),
            engagement.ended_at.map(|t| t.to_rfc3339()),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    for coach in &engagement.coaches {
        assign_coach(conn, &engagement.id, coach)?;
    }
    Ok(())
}

/// Fetch an engagement with its coach assignments.
pub fn get_engagement(
    conn: &Connection,
    id: &EngagementId,
) -> TetherResult<Option<Engagement>> {
    let row = conn
        .query_row(
            "SELECT engagement_id, org_id, company_id, status, linked_at, ended_at
             FROM engagements WHERE engagement_id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let Some((eid, org, company, status_str, linked_at, ended_at)) = row else {
        return Ok(None);
    };
    let status = EngagementStatus::parse(&status_str)
        .ok_or_else(|| to_storage_err(format!("unknown engagement status: {status_str}")))?;
    let ended_at: Option<DateTime<Utc>> = ended_at.as_deref().map(parse_ts).transpose()?;

    let coaches = coaches_for(conn, id)?;

    Ok(Some(Engagement {
        id: EngagementId(eid),
        org_id: org.into(),
        company_id: company.into(),
        status,
        linked_at: parse_ts(&linked_at)?,
        ended_at,
        coaches: coaches.into_iter().collect(),
    }))
}

/// Compare-and-swap the status. Returns the number of rows changed:
/// 0 means another transition won the race (or the id does not exist).
pub fn cas_status(
    conn: &Connection,
    id: &EngagementId,
    expected: EngagementStatus,
    to: EngagementStatus,
    ended_at: Option<DateTime<Utc>>,
) -> TetherResult<usize> {
    conn.execute(
        "UPDATE engagements SET status = ?1, ended_at = COALESCE(?2, ended_at)
         WHERE engagement_id = ?3 AND status = ?4",
        params![
            to.as_str(),
            ended_at.map(|t| t.to_rfc3339()),
            id.0,
            expected.as_str(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// The current status of an engagement.
pub fn current_status(
    conn: &Connection,
    id: &EngagementId,
) -> TetherResult<Option<EngagementStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM engagements WHERE engagement_id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    status
        .map(|s| {
            EngagementStatus::parse(&s)
                .ok_or_else(|| to_storage_err(format!("unknown engagement status: {s}")))
        })
        .transpose()
}

/// Assign a coach to an engagement (idempotent).
pub fn assign_coach(
    conn: &Connection,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO engagement_coaches (engagement_id, coach_id, assigned_at)
         VALUES (?1, ?2, ?3)",
        params![engagement_id.0, coach_id.0, Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Remove a coach assignment.
pub fn unassign_coach(
    conn: &Connection,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    conn.execute(
        "DELETE FROM engagement_coaches WHERE engagement_id = ?1 AND coach_id = ?2",
        params![engagement_id.0, coach_id.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Coaches assigned to an engagement.
pub fn coaches_for(
    conn: &Connection,
    engagement_id: &EngagementId,
) -> TetherResult<BTreeSet<PrincipalId>> {
    let mut stmt = conn
        .prepare("SELECT coach_id FROM engagement_coaches WHERE engagement_id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![engagement_id.0], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut coaches = BTreeSet::new();
    for row in rows {
        coaches.insert(PrincipalId(row.map_err(|e| to_storage_err(e.to_string()))?));
    }
    Ok(coaches)
}

/// Engagement ids directly assigned to a coach within one organization.
pub fn engagements_for_coach(
    conn: &Connection,
    org_id: &OrgId,
    coach_id: &PrincipalId,
) -> TetherResult<BTreeSet<EngagementId>> {
    let mut stmt = conn
        .prepare(
            "SELECT ec.engagement_id
             FROM engagement_coaches ec
             JOIN engagements e ON e.engagement_id = ec.engagement_id
             WHERE ec.coach_id = ?1 AND e.org_id = ?2",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![coach_id.0, org_id.0], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut ids = BTreeSet::new();
    for row in rows {
        ids.insert(EngagementId(row.map_err(|e| to_storage_err(e.to_string()))?));
    }
    Ok(ids)
}

/// All engagement ids of one organization.
pub fn engagements_for_org(
    conn: &Connection,
    org_id: &OrgId,
) -> TetherResult<BTreeSet<EngagementId>> {
    let mut stmt = conn
        .prepare("SELECT engagement_id FROM engagements WHERE org_id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![org_id.0], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut ids = BTreeSet::new();
    for row in rows {
        ids.insert(EngagementId(row.map_err(|e| to_storage_err(e.to_string()))?));
    }
    Ok(ids)
}
