//! StorageEngine — owns the ConnectionPool, runs migrations on open.

use std::path::Path;

use tether_core::errors::TetherResult;

use crate::migrations;
use crate::pool::ConnectionPool;

/// The storage engine. Owns the connection pool; the authorization layer
/// builds on it through `pool()`.
pub struct StorageEngine {
    pool: ConnectionPool,
    /// When true, use the read pool for read operations (file-backed mode).
    /// When false, route all reads through the writer (in-memory mode,
    /// because in-memory read pool connections are isolated databases).
    use_read_pool: bool,
}

impl StorageEngine {
    /// Open a storage engine backed by a file on disk.
    pub fn open(path: &Path) -> TetherResult<Self> {
        Self::open_with_pool_size(path, 4)
    }

    /// Open with an explicit read pool size.
    pub fn open_with_pool_size(path: &Path, read_pool_size: usize) -> TetherResult<Self> {
        let pool = ConnectionPool::open(path, read_pool_size)?;
        let engine = Self {
            pool,
            use_read_pool: true,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Open an in-memory storage engine (for testing). Routes all reads
    /// through the writer since in-memory read pool connections are
    /// isolated databases that can't see the writer's changes.
    pub fn open_in_memory() -> TetherResult<Self> {
        let pool = ConnectionPool::open_in_memory(1)?;
        let engine = Self {
            pool,
            use_read_pool: false,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Run migrations.
    fn initialize(&self) -> TetherResult<()> {
        self.pool.writer.with_conn_sync(|conn| {
            migrations::run_migrations(conn)?;
            Ok(())
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Execute a read-only query on the best available connection.
    /// File-backed: uses the read pool (no writer contention).
    /// In-memory: uses the writer (read pool is isolated).
    pub fn with_reader<F, T>(&self, f: F) -> TetherResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> TetherResult<T>,
    {
        if self.use_read_pool {
            self.pool.readers.with_conn(f)
        } else {
            self.pool.writer.with_conn_sync(f)
        }
    }
}
