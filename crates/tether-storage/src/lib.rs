//! # tether-storage
//!
//! SQLite persistence for the Tether engine: a single write connection
//! plus a read pool (WAL), numbered migrations, per-table-family query
//! modules, and the append-only audit log writer.

pub mod audit;
pub mod engine;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::StorageEngine;

use tether_core::errors::{StorageError, TetherError};

/// Wrap a low-level SQLite failure message into the workspace error type.
pub fn to_storage_err(message: String) -> TetherError {
    TetherError::Storage(StorageError::SqliteError { message })
}
