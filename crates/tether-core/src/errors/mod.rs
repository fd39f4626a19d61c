//! Error taxonomy for the Tether engine.
//!
//! Authorization *denial* is not an error: `decide` returns a
//! [`crate::models::Decision`] value. The error types here cover the
//! remaining outcomes — storage failures, concurrent-transition conflicts,
//! timeouts, and detected data-corruption invariant violations.

pub mod invariant;
pub mod storage_error;

pub use invariant::InvariantViolation;
pub use storage_error::StorageError;

use crate::models::{EngagementId, EngagementStatus, RecordId};

/// Result alias used across the workspace.
pub type TetherResult<T> = Result<T, TetherError>;

/// Umbrella error for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A concurrent transition won the compare-and-swap race. The caller
    /// should re-fetch current state and may retry once against it, never
    /// blindly against the same expected value.
    #[error("concurrent transition conflict on {engagement}: expected {expected}, found {actual}")]
    Conflict {
        engagement: EngagementId,
        expected: EngagementStatus,
        actual: EngagementStatus,
    },

    /// A transition the state machine never permits, e.g. out of `Ended`.
    #[error("illegal engagement transition: {from} -> {to}")]
    IllegalTransition {
        from: EngagementStatus,
        to: EngagementStatus,
    },

    /// Underlying store timed out or is unreachable. Retryable with
    /// backoff; must never be conflated with a denial.
    #[error("operation unavailable: {operation} timed out after {timeout_ms}ms")]
    Unavailable { operation: String, timeout_ms: u64 },

    /// Detected data corruption that could cause a cross-tenant leak.
    /// Fails the request loudly; the process keeps serving other tenants.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("engagement not found: {id}")]
    EngagementNotFound { id: EngagementId },

    #[error("record not found: {id}")]
    RecordNotFound { id: RecordId },

    /// The acting principal holds no role that permits the administrative
    /// operation (grant writes, transitions on foreign engagements).
    #[error("operation forbidden for actor {actor}: {reason}")]
    Forbidden { actor: String, reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl TetherError {
    /// Whether a caller may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
