//! Entitlement overlay: (module, scope) -> bool, absent = no veto.

use rusqlite::{params, Connection, OptionalExtension};

use tether_core::errors::TetherResult;
use tether_core::models::{Entitlement, EntitlementScope, ModuleKey};

use crate::to_storage_err;

/// Upsert an entitlement.
pub fn upsert_entitlement(conn: &Connection, entitlement: &Entitlement) -> TetherResult<()> {
    let (scope_kind, scope_id) = entitlement.scope.storage_key();
    conn.execute(
        "INSERT OR REPLACE INTO entitlements (module, scope_kind, scope_id, enabled, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entitlement.module.0,
            scope_kind,
            scope_id,
            entitlement.enabled as i64,
            entitlement.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// The explicit entitlement for (module, scope), if one exists.
pub fn get_entitlement(
    conn: &Connection,
    module: &ModuleKey,
    scope: &EntitlementScope,
) -> TetherResult<Option<bool>> {
    let (scope_kind, scope_id) = scope.storage_key();
    let enabled: Option<i64> = conn
        .query_row(
            "SELECT enabled FROM entitlements
             WHERE module = ?1 AND scope_kind = ?2 AND scope_id = ?3",
            params![module.0, scope_kind, scope_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(enabled.map(|e| e == 1))
}

/// Modules explicitly vetoed (enabled = 0) for the given scope.
pub fn vetoed_modules(
    conn: &Connection,
    scope: &EntitlementScope,
) -> TetherResult<Vec<ModuleKey>> {
    let (scope_kind, scope_id) = scope.storage_key();
    let mut stmt = conn
        .prepare(
            "SELECT module FROM entitlements
             WHERE scope_kind = ?1 AND scope_id = ?2 AND enabled = 0",
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![scope_kind, scope_id], |row| row.get::<_, String>(0))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut modules = Vec::new();
    for row in rows {
        modules.push(ModuleKey(row.map_err(|e| to_storage_err(e.to_string()))?));
    }
    Ok(modules)
}
