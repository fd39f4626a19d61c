//! Connection pragma setup. WAL keeps readers unblocked by the writer;
//! foreign keys stay on so corrupt scoping references fail at the store.

use rusqlite::Connection;

use tether_core::errors::TetherResult;

use crate::to_storage_err;

/// Pragmas for the single write connection.
pub fn apply_write_pragmas(conn: &Connection) -> TetherResult<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

/// Pragmas for read connections.
pub fn apply_read_pragmas(conn: &Connection) -> TetherResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
