//! Workspace-wide constants.

/// Default bound on any single engine operation, in milliseconds.
/// Operations that exceed this surface `TetherError::Unavailable`.
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5_000;

/// Default number of read connections in the pool.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Default audit retention window in months. Entries older than this are
/// eligible for rotation; the log itself is append-only.
pub const DEFAULT_AUDIT_RETENTION_MONTHS: u64 = 24;

/// Hard ceiling on management-hierarchy depth walked during subtree
/// resolution. A forest this deep indicates corrupt edges, not a real
/// reporting chain.
pub const MAX_HIERARCHY_DEPTH: usize = 64;
