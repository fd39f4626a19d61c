//! Orgs, companies, principals, and role bindings.

use rusqlite::{params, Connection};

use tether_core::errors::TetherResult;
use tether_core::models::{
    CoachingOrg, CompanyId, MemberCompany, OrgId, Principal, PrincipalId, Role, RoleBinding,
};

use crate::to_storage_err;

/// Insert a coaching organization.
pub fn insert_org(conn: &Connection, org: &CoachingOrg) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO coaching_orgs (org_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![org.id.0, org.name, org.created_at.to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Insert a member company.
pub fn insert_company(conn: &Connection, company: &MemberCompany) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO member_companies (company_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![company.id.0, company.name, company.created_at.to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Insert a principal.
pub fn insert_principal(conn: &Connection, principal: &Principal) -> TetherResult<()> {
    conn.execute(
        "INSERT INTO principals (principal_id, display_name) VALUES (?1, ?2)",
        params![principal.id.0, principal.display_name],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Add a role binding (idempotent).
pub fn add_role_binding(conn: &Connection, binding: &RoleBinding) -> TetherResult<()> {
    let role_str =
        serde_json::to_string(&binding.role).map_err(|e| to_storage_err(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO role_bindings (principal_id, role, org_id, company_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            binding.principal_id.0,
            role_str.trim_matches('"'),
            binding.org_id.as_ref().map(|o| o.0.as_str()),
            binding.company_id.as_ref().map(|c| c.0.as_str()),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// All role bindings for a principal, across every context.
pub fn bindings_for_principal(
    conn: &Connection,
    principal_id: &PrincipalId,
) -> TetherResult<Vec<RoleBinding>> {
    let mut stmt = conn
        .prepare(
            "SELECT principal_id, role, org_id, company_id
             FROM role_bindings WHERE principal_id = ?1",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;

    let rows = stmt
        .query_map(params![principal_id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut bindings = Vec::new();
    for row in rows {
        let (pid, role_str, org, company) = row.map_err(|e| to_storage_err(e.to_string()))?;
        let role: Role = serde_json::from_str(&format!("\"{role_str}\""))
            .map_err(|e| to_storage_err(format!("parse role: {e}")))?;
        bindings.push(RoleBinding {
            principal_id: PrincipalId(pid),
            role,
            org_id: org.map(OrgId),
            company_id: company.map(CompanyId),
        });
    }
    Ok(bindings)
}

/// The roles a principal holds within one coaching organization.
pub fn coaching_roles_in_org(
    conn: &Connection,
    principal_id: &PrincipalId,
    org_id: &OrgId,
) -> TetherResult<Vec<Role>> {
    let bindings = bindings_for_principal(conn, principal_id)?;
    Ok(bindings
        .into_iter()
        .filter(|b| b.org_id.as_ref() == Some(org_id))
        .map(|b| b.role)
        .filter(|r| r.is_coaching())
        .collect())
}

/// Whether the principal holds the site-admin role.
pub fn is_site_admin(conn: &Connection, principal_id: &PrincipalId) -> TetherResult<bool> {
    let bindings = bindings_for_principal(conn, principal_id)?;
    Ok(bindings.iter().any(|b| b.role == Role::SiteAdmin))
}

/// Whether the principal holds a member-company role in the given company.
pub fn company_role(
    conn: &Connection,
    principal_id: &PrincipalId,
    company_id: &CompanyId,
) -> TetherResult<Option<Role>> {
    let bindings = bindings_for_principal(conn, principal_id)?;
    Ok(bindings
        .into_iter()
        .filter(|b| b.company_id.as_ref() == Some(company_id))
        .map(|b| b.role)
        .find(|r| r.is_member_company()))
}

pub(crate) fn parse_ts(s: &str) -> TetherResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| to_storage_err(format!("parse timestamp {s}: {e}")))
}
