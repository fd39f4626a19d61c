//! Engagement lifecycle.
//!
//! An engagement is the relationship between one coaching organization
//! and one member company. Its status is a single enumerated state with
//! an explicit transition table, never a set of booleans, so illegal
//! states are unrepresentable and every transition is auditable.
//!
//! # Examples
//!
//! ```
//! use tether_core::models::EngagementStatus;
//!
//! assert!(EngagementStatus::PendingAcceptance.can_transition_to(EngagementStatus::Active));
//! assert!(!EngagementStatus::Ended.can_transition_to(EngagementStatus::Active));
//! assert!(EngagementStatus::Active.is_access_granting());
//! assert!(!EngagementStatus::Suspended.is_access_granting());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CompanyId, EngagementId, OrgId, PrincipalId};

/// Lifecycle state of an engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    /// Proposed but not yet accepted by the member company. Grants zero
    /// visibility: assignment alone is never sufficient for access.
    PendingAcceptance,
    /// The only access-granting state.
    Active,
    /// Paused. Coach assignments and scoped-record links are kept, but
    /// visibility is zero until resumed.
    Suspended,
    /// Terminal. Coaching-side access permanently revoked; the engagement
    /// row and its historical links are retained for audit.
    Ended,
}

impl EngagementStatus {
    /// Whether this status grants coaching-side visibility. Only `Active`
    /// does; `PendingAcceptance` and `Suspended` grant nothing.
    pub fn is_access_granting(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether the state machine permits `self -> to`.
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::PendingAcceptance, Self::Active)
                | (Self::Active, Self::Suspended)
                | (Self::Suspended, Self::Active)
                | (Self::Active, Self::Ended)
                | (Self::Suspended, Self::Ended)
        )
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Stable string form used in storage and audit snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingAcceptance => "pending_acceptance",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Ended => "ended",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_acceptance" => Some(Self::PendingAcceptance),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The relationship record between one coaching organization and one
/// member company. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub id: EngagementId,
    pub org_id: OrgId,
    pub company_id: CompanyId,
    pub status: EngagementStatus,
    /// When the relationship was first proposed or requested.
    pub linked_at: DateTime<Utc>,
    /// Set exactly once, when the engagement transitions to `Ended`.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Coaches currently assigned to this engagement.
    #[serde(default)]
    pub coaches: Vec<PrincipalId>,
}

impl Engagement {
    /// A new engagement in `PendingAcceptance`.
    pub fn propose(org_id: OrgId, company_id: CompanyId) -> Self {
        Self {
            id: EngagementId::generate(),
            org_id,
            company_id,
            status: EngagementStatus::PendingAcceptance,
            linked_at: Utc::now(),
            ended_at: None,
            coaches: Vec::new(),
        }
    }
}
