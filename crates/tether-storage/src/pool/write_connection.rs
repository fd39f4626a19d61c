//! The single write connection. All mutations flow through here, which
//! serializes them; async callers hop onto the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use tether_core::errors::{StorageError, TetherError, TetherResult};

use super::pragmas::apply_write_pragmas;
use crate::to_storage_err;

/// Owns the one connection allowed to write.
pub struct WriteConnection {
    conn: Arc<Mutex<Connection>>,
}

impl WriteConnection {
    /// Open the write connection for the given database path.
    pub fn open(path: &Path) -> TetherResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        apply_write_pragmas(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory write connection (for testing).
    pub fn open_in_memory() -> TetherResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        apply_write_pragmas(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a closure with the write connection, synchronously.
    pub fn with_conn_sync<F, T>(&self, f: F) -> TetherResult<T>
    where
        F: FnOnce(&Connection) -> TetherResult<T>,
    {
        let guard = self.conn.lock().map_err(|e| {
            TetherError::Storage(StorageError::LockPoisoned {
                details: e.to_string(),
            })
        })?;
        f(&guard)
    }

    /// Execute a closure with the write connection from async context.
    /// The closure runs on the blocking pool; captures must be owned.
    pub async fn with_conn<F, T>(&self, f: F) -> TetherResult<T>
    where
        F: FnOnce(&Connection) -> TetherResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| {
                TetherError::Storage(StorageError::LockPoisoned {
                    details: e.to_string(),
                })
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| to_storage_err(format!("blocking task failed: {e}")))?
    }
}
