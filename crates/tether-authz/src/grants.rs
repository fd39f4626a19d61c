//! Grant registry operations.
//!
//! Grants relax the non-scoped-create default within an already-active,
//! already-in-scope engagement. They never cross organizations and never
//! outlive engagement-status restrictions; those checks stay in the
//! decision path, which consults grants last among the relaxations.

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use tether_core::errors::{TetherError, TetherResult};
use tether_core::models::{
    AuditActor, AuditEntry, AuditKind, Capability, Engagement, EngagementId, Grant, PrincipalId,
    Role,
};

use tether_storage::audit;
use tether_storage::queries::{directory_ops, engagement_ops, grant_ops};

/// Set (or overwrite) a grant. Only a coaching-org admin of the
/// engagement's org or a member-company admin of its company may write
/// grants; the write is audited.
pub fn set_grant(
    conn: &Connection,
    actor: &PrincipalId,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
    capability: Capability,
    enabled: bool,
) -> TetherResult<Grant> {
    let engagement = require_engagement(conn, engagement_id)?;
    require_grant_writer(conn, actor, &engagement)?;

    let grant = Grant {
        engagement_id: engagement_id.clone(),
        coach_id: coach_id.clone(),
        capability,
        enabled,
        granted_at: Utc::now(),
        granted_by: actor.clone(),
    };
    grant_ops::upsert_grant(conn, &grant)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::GrantSet,
        "grant",
        &format!("{engagement_id}:{coach_id}:{capability}"),
    )
    .with_after(serde_json::json!({ "enabled": enabled }));
    audit::record_or_report(conn, &entry);

    info!(engagement = %engagement_id, coach = %coach_id, capability = %capability, enabled, "grant set");
    Ok(grant)
}

/// Remove a grant, restoring the restrictive default.
pub fn clear_grant(
    conn: &Connection,
    actor: &PrincipalId,
    engagement_id: &EngagementId,
    coach_id: &PrincipalId,
    capability: Capability,
) -> TetherResult<()> {
    let engagement = require_engagement(conn, engagement_id)?;
    require_grant_writer(conn, actor, &engagement)?;

    grant_ops::clear_grant(conn, engagement_id, coach_id, capability)?;

    let entry = AuditEntry::new(
        AuditActor::Principal(actor.clone()),
        AuditKind::GrantCleared,
        "grant",
        &format!("{engagement_id}:{coach_id}:{capability}"),
    );
    audit::record_or_report(conn, &entry);

    info!(engagement = %engagement_id, coach = %coach_id, capability = %capability, "grant cleared");
    Ok(())
}

/// Whether a non-scoped-create grant applies for this coach in an
/// engagement that is currently active. Inactive engagements nullify
/// their grants without deleting them.
pub fn non_scoped_create_allowed(
    conn: &Connection,
    engagement: &Engagement,
    coach_id: &PrincipalId,
) -> TetherResult<bool> {
    if !engagement.status.is_access_granting() {
        return Ok(false);
    }
    grant_ops::has_grant(
        conn,
        &engagement.id,
        coach_id,
        Capability::AllowNonScopedCreate,
    )
}

fn require_engagement(conn: &Connection, id: &EngagementId) -> TetherResult<Engagement> {
    engagement_ops::get_engagement(conn, id)?
        .ok_or_else(|| TetherError::EngagementNotFound { id: id.clone() })
}

fn require_grant_writer(
    conn: &Connection,
    actor: &PrincipalId,
    engagement: &Engagement,
) -> TetherResult<()> {
    let is_org_admin = directory_ops::coaching_roles_in_org(conn, actor, &engagement.org_id)?
        .contains(&Role::CoachingOrgAdmin);
    let is_company_admin = directory_ops::company_role(conn, actor, &engagement.company_id)?
        == Some(Role::MemberCompanyAdmin);
    if is_org_admin || is_company_admin {
        return Ok(());
    }
    Err(TetherError::Forbidden {
        actor: actor.to_string(),
        reason: "grant writes require an admin of either party".into(),
    })
}
