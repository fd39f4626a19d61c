//! Role/hierarchy resolver.
//!
//! Maps a (principal, acting org) pair to the set of engagement ids the
//! principal may act on. Subtree resolution is a transitive closure over
//! the management edge list: breadth-first, visited-set deduped, and
//! cycle-safe — a corrupt cyclic edge set cannot loop the walk, and a
//! coach reachable through two managers appears once.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use tracing::debug;

use tether_core::errors::{InvariantViolation, TetherResult};
use tether_core::models::{EngagementId, OrgId, PrincipalId, ResolvedScope, Role};

use tether_storage::queries::{directory_ops, engagement_ops, hierarchy_ops};

/// Resolve the engagement sets for a principal acting in one organization.
///
/// - `coach`: exactly the engagements directly assigned to them.
/// - `coaching_manager`: own assignments plus every engagement of every
///   coach in their subtree.
/// - `coaching_org_admin`: all engagements of the organization.
/// - `site_admin`: nothing — cross-org access exists only on the
///   separately audited elevated path.
pub fn resolve_scope(
    conn: &Connection,
    principal_id: &PrincipalId,
    org_id: &OrgId,
    max_depth: usize,
) -> TetherResult<ResolvedScope> {
    let roles = directory_ops::coaching_roles_in_org(conn, principal_id, org_id)?;
    if roles.is_empty() {
        return Ok(ResolvedScope::default());
    }

    if roles.contains(&Role::CoachingOrgAdmin) {
        let all = engagement_ops::engagements_for_org(conn, org_id)?;
        debug!(principal = %principal_id, org = %org_id, count = all.len(), "resolved as org admin");
        return Ok(ResolvedScope::uniform(all));
    }

    let mut ids: BTreeSet<EngagementId> =
        engagement_ops::engagements_for_coach(conn, org_id, principal_id)?;

    if roles.contains(&Role::CoachingManager) {
        let adjacency = hierarchy_ops::adjacency(conn, org_id)?;
        let subtree = subtree_coaches(&adjacency, principal_id, org_id, max_depth)?;
        for coach in &subtree {
            ids.extend(engagement_ops::engagements_for_coach(conn, org_id, coach)?);
        }
    }

    debug!(principal = %principal_id, org = %org_id, count = ids.len(), "resolved scope");
    Ok(ResolvedScope::uniform(ids))
}

/// All coaches reachable from `root` by following manager -> coach edges
/// downward. Excludes `root` itself. Pure over the adjacency snapshot so
/// it can be tested without a store.
pub fn subtree_coaches(
    adjacency: &BTreeMap<PrincipalId, BTreeSet<PrincipalId>>,
    root: &PrincipalId,
    org_id: &OrgId,
    max_depth: usize,
) -> TetherResult<BTreeSet<PrincipalId>> {
    let mut visited: BTreeSet<PrincipalId> = BTreeSet::new();
    let mut frontier: Vec<PrincipalId> = adjacency
        .get(root)
        .map(|children| children.iter().cloned().collect())
        .unwrap_or_default();

    let mut depth = 0;
    while !frontier.is_empty() {
        depth += 1;
        if depth > max_depth {
            return Err(InvariantViolation::HierarchyTooDeep {
                org: org_id.clone(),
                max_depth,
            }
            .into());
        }
        let mut next = Vec::new();
        for coach in frontier {
            if !visited.insert(coach.clone()) {
                continue;
            }
            if let Some(children) = adjacency.get(&coach) {
                next.extend(children.iter().cloned());
            }
        }
        frontier = next;
    }

    // A cyclic edge set could route the walk back through the root; it
    // must never grant the root to itself.
    visited.remove(root);
    Ok(visited)
}
