//! Explicit per-engagement grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EngagementId, PrincipalId};

/// Capabilities a grant can carry. Grants are additive relaxations only;
/// absence implies the restrictive default. They never widen access
/// across organizations or past engagement-status restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Allows the coach to *create* records without an engagement scope
    /// inside an already-active, already-in-scope engagement context.
    /// Reads of pre-existing non-scoped records stay forbidden.
    AllowNonScopedCreate,
}

impl Capability {
    /// Stable string form used in storage and audit snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowNonScopedCreate => "allow_non_scoped_create",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow_non_scoped_create" => Some(Self::AllowNonScopedCreate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A boolean capability attached to one (engagement, coach) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub engagement_id: EngagementId,
    pub coach_id: PrincipalId,
    pub capability: Capability,
    pub enabled: bool,
    pub granted_at: DateTime<Utc>,
    pub granted_by: PrincipalId,
}
