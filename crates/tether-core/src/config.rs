//! Configuration for the access-control engine.
//!
//! # Examples
//!
//! ```
//! use tether_core::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.op_timeout_ms, 5_000);
//! assert_eq!(config.read_pool_size, 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::errors::{TetherError, TetherResult};

/// Configuration for the Tether engine.
///
/// All fields have defaults so a partial TOML document (or none at all)
/// produces a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on any single engine operation, in milliseconds.
    /// On expiry the operation surfaces `Unavailable`, never a denial.
    pub op_timeout_ms: u64,
    /// Number of read connections in the pool. Clamped to 1..=8 by the pool.
    pub read_pool_size: usize,
    /// Audit retention window in months (rotation eligibility, not deletion
    /// of the append-only log).
    pub audit_retention_months: u64,
    /// Maximum management-hierarchy depth walked during subtree resolution.
    pub max_hierarchy_depth: usize,
    /// When true, a detected invariant violation also writes an audit entry
    /// before the request is failed. Default: true.
    pub audit_invariant_violations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: constants::DEFAULT_OP_TIMEOUT_MS,
            read_pool_size: constants::DEFAULT_READ_POOL_SIZE,
            audit_retention_months: constants::DEFAULT_AUDIT_RETENTION_MONTHS,
            max_hierarchy_depth: constants::MAX_HIERARCHY_DEPTH,
            audit_invariant_violations: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a TOML document. Missing fields fall back
    /// to their defaults.
    pub fn from_toml_str(s: &str) -> TetherResult<Self> {
        toml::from_str(s).map_err(|e| TetherError::Config {
            reason: e.to_string(),
        })
    }
}
