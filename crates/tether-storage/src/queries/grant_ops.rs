//! Grant registry: (engagement, coach, capability) -> bool, default false.

use rusqlite::{params, Connection, OptionalExtension};

use tether_core::errors::TetherResult;
use tether_core::models::{Capability, EngagementId, Grant, PrincipalId};

use crate::to_storage_err;

/// Upsert a grant.
pub fn upsert_grant(conn: &Connection, grant: &Grant) -> TetherResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO grants
            (engagement_id, coach_id, capability, enabled, granted_at, granted_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            grant.engagement_id.0,
            grant.coach_id.0,
            grant.capability.as_str(),
            grant.enabled as i64,
            grant.granted_at.to_rfc3339(),
            grant.granted_by.0,
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Remove a grant row entirely, restoring the restrictive default.
pub fn clear_grant(
    conn: &Connection,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
    capability: Capability,
) -> TetherResult<()> {
    conn.execute(
        "DELETE FROM grants WHERE engagement_id = ?1 AND coach_id = ?2 AND capability = ?3",
        params![engagement_id.0, coach_id.0, capability.as_str()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Whether the capability is granted. Absent row = false.
pub fn has_grant(
    conn: &Connection,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
    capability: Capability,
) -> TetherResult<bool> {
    let enabled: Option<i64> = conn
        .query_row(
            "SELECT enabled FROM grants
             WHERE engagement_id = ?1 AND coach_id = ?2 AND capability = ?3",
            params![engagement_id.0, coach_id.0, capability.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(enabled == Some(1))
}
