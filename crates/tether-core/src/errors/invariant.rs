use crate::models::{CompanyId, EngagementId, OrgId, PrincipalId, RecordId};

/// Invariant violations indicate data corruption that could otherwise cause
/// a cross-tenant leak. They abort the specific request and are logged at
/// error severity plus audited; they never crash the process.
#[derive(Debug, thiserror::Error)]
pub enum InvariantViolation {
    /// Adding this management edge would close a cycle in the forest.
    #[error("management edge {manager} -> {coach} in {org} would create a cycle")]
    ManagementCycle {
        org: OrgId,
        manager: PrincipalId,
        coach: PrincipalId,
    },

    /// A record's engagement belongs to a different organization than the
    /// record's own company claims.
    #[error(
        "record {record} (company {company}) is scoped to engagement {engagement} \
         owned by {engagement_org}, which does not serve that company"
    )]
    OrgMismatch {
        record: RecordId,
        company: CompanyId,
        engagement: EngagementId,
        engagement_org: OrgId,
    },

    /// Subtree resolution exceeded the configured depth ceiling, which a
    /// well-formed forest cannot do.
    #[error("management hierarchy in {org} exceeds depth {max_depth}")]
    HierarchyTooDeep { org: OrgId, max_depth: usize },
}
