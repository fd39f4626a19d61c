//! Decision types returned by the scoping engine.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ids::EngagementId;

/// The action a principal is attempting against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Whether this action mutates data.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Why a request was denied. Denials are expected control flow, surfaced
/// as values; they are never retried and never abort unrelated work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The record's engagement belongs to a different coaching org than
    /// the principal's declared acting context.
    CrossOrg,
    /// The engagement exists and is in scope, but its status is not
    /// access-granting (`pending_acceptance`, `suspended`, or `ended`).
    InactiveEngagement,
    /// The engagement belongs to the right org but is outside the
    /// principal's resolved subtree.
    OutOfSubtree,
    /// The record carries no engagement scope and the action (or the
    /// absence of a grant) forbids touching it.
    NonScopedForbidden,
    /// The entitlement overlay vetoes the record's module.
    EntitlementVetoed,
    /// The principal holds no role at all in the declared acting context.
    NoCoachingRole,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CrossOrg => "cross-org",
            Self::InactiveEngagement => "inactive-engagement",
            Self::OutOfSubtree => "out-of-subtree",
            Self::NonScopedForbidden => "non-scoped-forbidden",
            Self::EntitlementVetoed => "entitlement-vetoed",
            Self::NoCoachingRole => "no-coaching-role",
        };
        write!(f, "{s}")
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// Allowed. For creates against a coaching-scoped context the
    /// resolved engagement id is exposed so the caller can stamp it on
    /// the new record.
    Allow {
        #[serde(default)]
        engagement_id: Option<EngagementId>,
    },
    Deny { reason: DenyReason },
}

impl Decision {
    /// Allow without an engagement to stamp.
    pub fn allow() -> Self {
        Self::Allow {
            engagement_id: None,
        }
    }

    /// Allow, exposing the engagement id for the caller to stamp.
    pub fn allow_scoped(engagement_id: EngagementId) -> Self {
        Self::Allow {
            engagement_id: Some(engagement_id),
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self::Deny { reason }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Deny { reason } => Some(*reason),
            Self::Allow { .. } => None,
        }
    }
}

/// The engagement ids a principal may act on in one organization,
/// partitioned by action. Sets, not lists: a coach reachable through two
/// managers transitively still appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedScope {
    pub read: BTreeSet<EngagementId>,
    pub write: BTreeSet<EngagementId>,
    pub delete: BTreeSet<EngagementId>,
}

impl ResolvedScope {
    /// A scope granting the same engagement set for every action.
    pub fn uniform(ids: BTreeSet<EngagementId>) -> Self {
        Self {
            read: ids.clone(),
            write: ids.clone(),
            delete: ids,
        }
    }

    /// The set governing the given action.
    pub fn for_action(&self, action: Action) -> &BTreeSet<EngagementId> {
        match action {
            Action::Read => &self.read,
            Action::Create | Action::Update => &self.write,
            Action::Delete => &self.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.delete.is_empty()
    }
}
