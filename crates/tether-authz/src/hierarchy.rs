//! Management hierarchy writes, with upfront cycle rejection.

use rusqlite::Connection;
use tracing::{error, info};

use tether_core::errors::{InvariantViolation, TetherError, TetherResult};
use tether_core::models::{
    AuditActor, AuditEntry, AuditKind, ManagementEdge, OrgId, PrincipalId, Role,
};

use tether_storage::audit;
use tether_storage::queries::{directory_ops, hierarchy_ops};

/// Set a manager -> coach edge. Replaces any previous manager of the
/// coach (one direct manager per org). An edge that would close a cycle
/// is refused as an invariant violation and audited.
pub fn set_edge(conn: &Connection, actor: &PrincipalId, edge: &ManagementEdge) -> TetherResult<()> {
    require_org_admin(conn, actor, &edge.org_id)?;

    // Self-edges and edges whose manager already reports (transitively)
    // to the coach would close a cycle.
    let closes_cycle = edge.manager_id == edge.coach_id
        || hierarchy_ops::is_reachable(conn, &edge.org_id, &edge.coach_id, &edge.manager_id)?;
    if closes_cycle {
        let violation = InvariantViolation::ManagementCycle {
            org: edge.org_id.clone(),
            manager: edge.manager_id.clone(),
            coach: edge.coach_id.clone(),
        };
        error!(org = %edge.org_id, manager = %edge.manager_id, coach = %edge.coach_id,
            "management edge rejected: would create a cycle");
        let entry = AuditEntry::new(
            AuditActor::Principal(actor.clone()),
            AuditKind::InvariantViolation,
            "management_edge",
            &format!("{}->{}", edge.manager_id, edge.coach_id),
        )
        .with_details(serde_json::json!({ "violation": violation.to_string() }));
        audit::record_or_report(conn, &entry);
        return Err(TetherError::Invariant(violation));
    }

    hierarchy_ops::upsert_edge(conn, edge)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::EdgeSet,
        "management_edge",
        &format!("{}->{}", edge.manager_id, edge.coach_id),
    )
    .with_details(serde_json::json!({ "org": edge.org_id.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(org = %edge.org_id, manager = %edge.manager_id, coach = %edge.coach_id, "management edge set");
    Ok(())
}

/// Remove the edge above a coach.
pub fn remove_edge(
    conn: &Connection,
    actor: &PrincipalId,
    org_id: &OrgId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    require_org_admin(conn, actor, org_id)?;
    hierarchy_ops::remove_edge(conn, org_id, coach_id)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::EdgeRemoved,
        "management_edge",
        coach_id.as_str(),
    )
    .with_details(serde_json::json!({ "org": org_id.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(org = %org_id, coach = %coach_id, "management edge removed");
    Ok(())
}

fn require_org_admin(conn: &Connection, actor: &PrincipalId, org_id: &OrgId) -> TetherResult<()> {
    let roles = directory_ops::coaching_roles_in_org(conn, actor, org_id)?;
    if roles.contains(&Role::CoachingOrgAdmin) {
        return Ok(());
    }
    Err(TetherError::Forbidden {
        actor: actor.to_string(),
        reason: format!("hierarchy changes require coaching_org_admin of {org_id}"),
    })
}
