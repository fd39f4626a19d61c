//! Numbered schema migrations, tracked in `schema_version`.

pub mod v001_core_tables;
pub mod v002_audit_tables;

use rusqlite::Connection;

use tether_core::errors::{StorageError, TetherError, TetherResult};

use crate::to_storage_err;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Run all pending migrations. Idempotent: each migration only applies
/// when the recorded version is below it.
pub fn run_migrations(conn: &Connection) -> TetherResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current = current_version(conn)?;

    if current < 1 {
        apply(conn, 1, v001_core_tables::migrate)?;
    }
    if current < 2 {
        apply(conn, 2, v002_audit_tables::migrate)?;
    }

    Ok(())
}

/// The highest applied migration version, 0 when none.
pub fn current_version(conn: &Connection) -> TetherResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get::<_, u32>(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

fn apply(
    conn: &Connection,
    version: u32,
    migrate: fn(&Connection) -> TetherResult<()>,
) -> TetherResult<()> {
    migrate(conn).map_err(|e| {
        TetherError::Storage(StorageError::MigrationFailed {
            version,
            reason: e.to_string(),
        })
    })?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
