//! Management hierarchy edges.

use serde::{Deserialize, Serialize};

use super::ids::{OrgId, PrincipalId};

/// A directed `manager -> coach` relation within one coaching
/// organization. The edge set must form a forest: a coach has at most one
/// direct manager per organization (enforced by the storage primary key),
/// and cycles are rejected as invariant violations before they are
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagementEdge {
    pub org_id: OrgId,
    pub manager_id: PrincipalId,
    pub coach_id: PrincipalId,
}
