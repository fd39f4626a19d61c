//! Management hierarchy edges: upsert, removal, adjacency load, and a
//! reachability probe used to reject cycles before they are written.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, Connection};

use tether_core::errors::TetherResult;
use tether_core::models::{ManagementEdge, OrgId, PrincipalId};

use crate::to_storage_err;

/// Upsert a manager -> coach edge. The primary key (org_id, coach_id)
/// makes this replace any previous manager of the coach.
pub fn upsert_edge(conn: &Connection, edge: &ManagementEdge) -> TetherResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO management_edges (org_id, manager_id, coach_id)
         VALUES (?1, ?2, ?3)",
        params![edge.org_id.0, edge.manager_id.0, edge.coach_id.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Remove the edge above a coach.
pub fn remove_edge(
    conn: &Connection,
    org_id: &OrgId,
    coach_id: &PrincipalId,
) -> TetherResult<()> {
    conn.execute(
        "DELETE FROM management_edges WHERE org_id = ?1 AND coach_id = ?2",
        params![org_id.0, coach_id.0],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Load the manager -> coaches adjacency for one organization.
pub fn adjacency(
    conn: &Connection,
    org_id: &OrgId,
) -> TetherResult<BTreeMap<PrincipalId, BTreeSet<PrincipalId>>> {
    let mut stmt = conn
        .prepare("SELECT manager_id, coach_id FROM management_edges WHERE org_id = ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![org_id.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut adj: BTreeMap<PrincipalId, BTreeSet<PrincipalId>> = BTreeMap::new();
    for row in rows {
        let (manager, coach) = row.map_err(|e| to_storage_err(e.to_string()))?;
        adj.entry(PrincipalId(manager))
            .or_default()
            .insert(PrincipalId(coach));
    }
    Ok(adj)
}

/// Whether `to` is reachable from `from` by following edges downward.
/// Used to reject a new edge `manager -> coach` when the manager is
/// already reachable from the coach, which would close a cycle.
pub fn is_reachable(
    conn: &Connection,
    org_id: &OrgId,
    from: &PrincipalId,
    to: &PrincipalId,
) -> TetherResult<bool> {
    let adj = adjacency(conn, org_id)?;
    let mut visited: BTreeSet<PrincipalId> = BTreeSet::new();
    let mut frontier = vec![from.clone()];
    while let Some(node) = frontier.pop() {
        if &node == to {
            return Ok(true);
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        if let Some(children) = adj.get(&node) {
            frontier.extend(children.iter().cloned());
        }
    }
    Ok(false)
}
