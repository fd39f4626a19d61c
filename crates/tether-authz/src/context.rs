//! Principal snapshots: the authorization-relevant view of a user within
//! one declared acting context.

use rusqlite::Connection;

use tether_core::errors::TetherResult;
use tether_core::models::{CompanyId, OrgId, PrincipalId, Role};

use tether_storage::queries::directory_ops;

/// The roles a principal holds, filtered to one declared acting
/// organization. Contexts never leak: roles held in other organizations
/// or companies are invisible through this snapshot except for the
/// member-company roles, which are keyed by company and only consulted
/// for records owned by that company.
///
/// The company roles survive even when the request declares a coaching
/// `acting_org`: a principal who is both a coach in org A and an admin of
/// company X keeps company-path access to X's own records while acting in
/// org A. The declared org narrows which *coaching* roles apply, nothing
/// more; it never widens access beyond what either context grants alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalSnapshot {
    pub principal_id: PrincipalId,
    /// The coaching organization the request declared it acts in.
    pub acting_org: Option<OrgId>,
    /// Coaching roles held within `acting_org`.
    pub org_roles: Vec<Role>,
    /// Member-company roles, keyed by company.
    pub company_roles: Vec<(CompanyId, Role)>,
}

impl PrincipalSnapshot {
    /// Load the snapshot for a principal acting in an optional org context.
    pub fn load(
        conn: &Connection,
        principal_id: &PrincipalId,
        acting_org: Option<&OrgId>,
    ) -> TetherResult<Self> {
        let bindings = directory_ops::bindings_for_principal(conn, principal_id)?;

        let org_roles = match acting_org {
            Some(org) => bindings
                .iter()
                .filter(|b| b.org_id.as_ref() == Some(org))
                .map(|b| b.role)
                .filter(|r| r.is_coaching())
                .collect(),
            None => Vec::new(),
        };

        let company_roles = bindings
            .iter()
            .filter(|b| b.role.is_member_company())
            .filter_map(|b| b.company_id.clone().map(|c| (c, b.role)))
            .collect();

        Ok(Self {
            principal_id: principal_id.clone(),
            acting_org: acting_org.cloned(),
            org_roles,
            company_roles,
        })
    }

    /// Whether the snapshot carries any coaching role in the acting org.
    pub fn has_coaching_role(&self) -> bool {
        !self.org_roles.is_empty()
    }

    /// The member-company role this principal holds in the given company.
    pub fn role_in_company(&self, company: &CompanyId) -> Option<Role> {
        self.company_roles
            .iter()
            .find(|(c, _)| c == company)
            .map(|(_, r)| *r)
    }
}
