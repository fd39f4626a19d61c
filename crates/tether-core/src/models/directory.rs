//! Organizations, companies, principals, and role bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CompanyId, OrgId, PrincipalId};

/// A tenant providing coaching services. Organizations are mutually
/// opaque: no cross-organization visibility is ever permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingOrg {
    pub id: OrgId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A tenant receiving coaching services. Member companies retain full
/// access to their own data regardless of engagement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCompany {
    pub id: CompanyId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A user. Roles live on [`RoleBinding`]s, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
}

/// The roles a principal can hold. Coaching roles are always bound to one
/// organization; member-company roles to one company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator. Resolves nothing by default; cross-org access
    /// only through the explicitly audited elevated path.
    SiteAdmin,
    /// Administers one coaching organization; sees all its engagements.
    CoachingOrgAdmin,
    /// Supervises a subtree of coaches within one organization.
    CoachingManager,
    /// Works directly on assigned engagements.
    Coach,
    /// Administers one member company.
    MemberCompanyAdmin,
    /// Regular user within one member company.
    MemberCompanyUser,
}

impl Role {
    /// Whether this role acts on behalf of a coaching organization.
    pub fn is_coaching(self) -> bool {
        matches!(
            self,
            Self::CoachingOrgAdmin | Self::CoachingManager | Self::Coach
        )
    }

    /// Whether this role acts on behalf of a member company.
    pub fn is_member_company(self) -> bool {
        matches!(self, Self::MemberCompanyAdmin | Self::MemberCompanyUser)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SiteAdmin => "site_admin",
            Self::CoachingOrgAdmin => "coaching_org_admin",
            Self::CoachingManager => "coaching_manager",
            Self::Coach => "coach",
            Self::MemberCompanyAdmin => "member_company_admin",
            Self::MemberCompanyUser => "member_company_user",
        };
        write!(f, "{s}")
    }
}

/// A role held by a principal within one organizational or company
/// context. Contexts never leak into each other: resolution always
/// filters bindings by the declared acting context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleBinding {
    pub principal_id: PrincipalId,
    pub role: Role,
    /// Set for coaching roles; `None` otherwise.
    #[serde(default)]
    pub org_id: Option<OrgId>,
    /// Set for member-company roles; `None` otherwise.
    #[serde(default)]
    pub company_id: Option<CompanyId>,
}

impl RoleBinding {
    /// Binding of a coaching role within an organization.
    pub fn coaching(principal_id: PrincipalId, role: Role, org_id: OrgId) -> Self {
        Self {
            principal_id,
            role,
            org_id: Some(org_id),
            company_id: None,
        }
    }

    /// Binding of a member-company role within a company.
    pub fn company(principal_id: PrincipalId, role: Role, company_id: CompanyId) -> Self {
        Self {
            principal_id,
            role,
            org_id: None,
            company_id: Some(company_id),
        }
    }

    /// Binding of the site-admin role (no tenant context).
    pub fn site_admin(principal_id: PrincipalId) -> Self {
        Self {
            principal_id,
            role: Role::SiteAdmin,
            org_id: None,
            company_id: None,
        }
    }
}
