//! Entitlement overlay: site-level module vetoes.
//!
//! Evaluated strictly last in the decision path. An explicit `false`
//! vetoes regardless of company toggles, grants, or role; `true` grants
//! nothing on its own (pure intersection, never a union).

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use tether_core::errors::{TetherError, TetherResult};
use tether_core::models::{
    AuditActor, AuditEntry, AuditKind, CompanyId, Entitlement, EntitlementScope, ModuleKey, OrgId,
};

use tether_storage::audit;
use tether_storage::queries::{directory_ops, entitlement_ops};

/// Set an entitlement. Site-admin (or system) only: the overlay is
/// maintained independently of any company's self-service settings.
pub fn set_entitlement(
    conn: &Connection,
    actor: &AuditActor,
    module: &ModuleKey,
    scope: EntitlementScope,
    enabled: bool,
) -> TetherResult<Entitlement> {
    if let AuditActor::Principal(principal) = actor {
        if !directory_ops::is_site_admin(conn, principal)? {
            return Err(TetherError::Forbidden {
                actor: principal.to_string(),
                reason: "entitlement changes require site_admin".into(),
            });
        }
    }

    let entitlement = Entitlement {
        module: module.clone(),
        scope,
        enabled,
        updated_at: Utc::now(),
    };
    entitlement_ops::upsert_entitlement(conn, &entitlement)?;

    let (scope_kind, scope_id) = entitlement.scope.storage_key();
    let entry = AuditEntry::new(
        actor.clone(),
        AuditKind::EntitlementSet,
        "entitlement",
        &format!("{module}:{scope_kind}:{scope_id}"),
    )
    .with_after(serde_json::json!({ "enabled": enabled }));
    audit::record_or_report(conn, &entry);

    info!(module = %module, scope_kind, scope_id, enabled, "entitlement set");
    Ok(entitlement)
}

/// Whether the overlay vetoes a module for a company (and optionally the
/// acting org). Absent rows veto nothing; any explicit `false` at either
/// scope vetoes.
pub fn module_vetoed(
    conn: &Connection,
    module: &ModuleKey,
    company_id: &CompanyId,
    org_id: Option<&OrgId>,
) -> TetherResult<bool> {
    let company_scope = EntitlementScope::Company(company_id.clone());
    if entitlement_ops::get_entitlement(conn, module, &company_scope)? == Some(false) {
        return Ok(true);
    }
    if let Some(org) = org_id {
        let org_scope = EntitlementScope::Org(org.clone());
        if entitlement_ops::get_entitlement(conn, module, &org_scope)? == Some(false) {
            return Ok(true);
        }
    }
    Ok(false)
}
