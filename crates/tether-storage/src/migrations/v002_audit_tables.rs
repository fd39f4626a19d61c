//! v002: Append-only audit log.

use rusqlite::Connection;

use tether_core::errors::TetherResult;

use crate::to_storage_err;

/// Run the v002 migration.
pub fn migrate(conn: &Connection) -> TetherResult<()> {
    tracing::info!("v002: creating audit tables");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp   TEXT NOT NULL,
            actor       TEXT NOT NULL,
            kind        TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id   TEXT NOT NULL,
            before_json TEXT,
            after_json  TEXT,
            details     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_audit_kind ON audit_log(kind, timestamp);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    tracing::info!("v002: audit tables created");
    Ok(())
}
