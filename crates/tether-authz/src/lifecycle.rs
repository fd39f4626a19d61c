//! Engagement lifecycle transitions.
//!
//! Transitions are serialized with a compare-and-swap on the current
//! status: the losing side of a concurrent transition gets `Conflict`,
//! never a silent overwrite — the state machine is not commutative.
//! Every applied transition writes an audit entry with before/after
//! snapshots.

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use tether_core::errors::{TetherError, TetherResult};
use tether_core::models::{
    AuditActor, AuditEntry, AuditKind, CompanyId, Engagement, EngagementId, EngagementStatus,
    OrgId, PrincipalId, Role,
};

use tether_storage::audit;
use tether_storage::queries::{directory_ops, engagement_ops};

/// Create an engagement in `pending_acceptance`. The proposer must be a
/// coaching-org admin of the org, or a member-company admin of the
/// company (the "company requests a relationship" path).
pub fn propose(
    conn: &Connection,
    actor: &PrincipalId,
    org_id: &OrgId,
    company_id: &CompanyId,
) -> TetherResult<Engagement> {
    let is_org_admin = directory_ops::coaching_roles_in_org(conn, actor, org_id)?
        .contains(&Role::CoachingOrgAdmin);
    let is_company_admin =
        directory_ops::company_role(conn, actor, company_id)? == Some(Role::MemberCompanyAdmin);
    if !is_org_admin && !is_company_admin {
        return Err(TetherError::Forbidden {
            actor: actor.to_string(),
            reason: "proposing an engagement requires org-admin or company-admin".into(),
        });
    }

    let engagement = Engagement::propose(org_id.clone(), company_id.clone());
    engagement_ops::insert_engagement(conn, &engagement)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::EngagementTransition,
        "engagement",
        engagement.id.as_str(),
    )
    .with_after(serde_json::json!({ "status": engagement.status.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(engagement = %engagement.id, org = %org_id, company = %company_id, "engagement proposed");
    Ok(engagement)
}

/// Member-company admin accepts: `pending_acceptance -> active`.
pub fn accept(conn: &Connection, actor: &PrincipalId, id: &EngagementId) -> TetherResult<Engagement> {
    let engagement = require(conn, id)?;
    require_company_admin(conn, actor, &engagement.company_id)?;
    transition(conn, actor, id, EngagementStatus::PendingAcceptance, EngagementStatus::Active)
}

/// Pause: `active -> suspended`. Either party's admin, or a site admin.
pub fn suspend(conn: &Connection, actor: &PrincipalId, id: &EngagementId) -> TetherResult<Engagement> {
    let engagement = require(conn, id)?;
    require_either_party_admin(conn, actor, &engagement)?;
    transition(conn, actor, id, EngagementStatus::Active, EngagementStatus::Suspended)
}

/// Resume: `suspended -> active`. Either party's admin, or a site admin.
pub fn resume(conn: &Connection, actor: &PrincipalId, id: &EngagementId) -> TetherResult<Engagement> {
    let engagement = require(conn, id)?;
    require_either_party_admin(conn, actor, &engagement)?;
    transition(conn, actor, id, EngagementStatus::Suspended, EngagementStatus::Active)
}

/// End: `active|suspended -> ended`. Terminal. The caller passes the
/// status it observed; a concurrent transition surfaces as `Conflict`.
pub fn end(
    conn: &Connection,
    actor: &PrincipalId,
    id: &EngagementId,
    observed: EngagementStatus,
) -> TetherResult<Engagement> {
    let engagement = require(conn, id)?;
    require_either_party_admin(conn, actor, &engagement)?;
    transition(conn, actor, id, observed, EngagementStatus::Ended)
}

/// Assign a coach. Requires an org-admin or manager role in the
/// engagement's org. Assignment alone grants no visibility; status does.
pub fn assign_coach(
    conn: &Connection,
    actor: &PrincipalId,
    id: &EngagementId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    let engagement = require(conn, id)?;
    require_org_manager(conn, actor, &engagement.org_id)?;
    engagement_ops::assign_coach(conn, id, coach_id)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::CoachAssigned,
        "engagement",
        id.as_str(),
    )
    .with_details(serde_json::json!({ "coach": coach_id.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(engagement = %id, coach = %coach_id, "coach assigned");
    Ok(())
}

/// Remove a coach assignment.
pub fn unassign_coach(
    conn: &Connection,
    actor: &PrincipalId,
    id: &EngagementId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    let engagement = require(conn, id)?;
    require_org_manager(conn, actor, &engagement.org_id)?;
    engagement_ops::unassign_coach(conn, id, coach_id)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::CoachUnassigned,
        "engagement",
        id.as_str(),
    )
    .with_details(serde_json::json!({ "coach": coach_id.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(engagement = %id, coach = %coach_id, "coach unassigned");
    Ok(())
}

/// The core compare-and-swap transition. Validates legality against the
/// transition table, then swaps only if the stored status still equals
/// `expected`; a lost race re-reads and reports `Conflict`.
pub fn transition(
    conn: &Connection,
    actor: &PrincipalId,
    id: &EngagementId,
    expected: EngagementStatus,
    to: EngagementStatus,
) -> TetherResult<Engagement> {
    if !expected.can_transition_to(to) {
        return Err(TetherError::IllegalTransition { from: expected, to });
    }

    let ended_at = (to == EngagementStatus::Ended).then(Utc::now);
    let changed = engagement_ops::cas_status(conn, id, expected, to, ended_at)?;
    if changed == 0 {
        let actual = engagement_ops::current_status(conn, id)?
            .ok_or_else(|| TetherError::EngagementNotFound { id: id.clone() })?;
        return Err(TetherError::Conflict {
            engagement: id.clone(),
            expected,
            actual,
        });
    }

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::EngagementTransition,
        "engagement",
        id.as_str(),
    )
    .with_before(serde_json::json!({ "status": expected.as_str() }))
    .with_after(serde_json::json!({ "status": to.as_str() }));
    audit::record_or_report(conn, &entry);

    info!(engagement = %id, from = %expected, to = %to, "engagement transitioned");
    require(conn, id)
}

fn require(conn: &Connection, id: &EngagementId) -> TetherResult<Engagement> {
    engagement_ops::get_engagement(conn, id)?
        .ok_or_else(|| TetherError::EngagementNotFound { id: id.clone() })
}

fn require_company_admin(
    conn: &Connection,
    actor: &PrincipalId,
    company_id: &CompanyId,
) -> TetherResult<()> {
    if directory_ops::company_role(conn, actor, company_id)? == Some(Role::MemberCompanyAdmin) {
        return Ok(());
    }
    Err(TetherError::Forbidden {
        actor: actor.to_string(),
        reason: format!("requires member_company_admin of {company_id}"),
    })
}

fn require_org_manager(conn: &Connection, actor: &PrincipalId, org_id: &OrgId) -> TetherResult<()> {
    let roles = directory_ops::coaching_roles_in_org(conn, actor, org_id)?;
    if roles.contains(&Role::CoachingOrgAdmin) || roles.contains(&Role::CoachingManager) {
        return Ok(());
    }
    Err(TetherError::Forbidden {
        actor: actor.to_string(),
        reason: format!("requires coaching_org_admin or coaching_manager of {org_id}"),
    })
}

fn require_either_party_admin(
    conn: &Connection,
    actor: &PrincipalId,
    engagement: &Engagement,
) -> TetherResult<()> {
    let is_org_admin = directory_ops::coaching_roles_in_org(conn, actor, &engagement.org_id)?
        .contains(&Role::CoachingOrgAdmin);
    let is_company_admin = directory_ops::company_role(conn, actor, &engagement.company_id)?
        == Some(Role::MemberCompanyAdmin);
    let is_site_admin = directory_ops::is_site_admin(conn, actor)?;
    if is_org_admin || is_company_admin || is_site_admin {
        return Ok(());
    }
    Err(TetherError::Forbidden {
        actor: actor.to_string(),
        reason: "transition requires an admin of either party or a site admin".into(),
    })
}
