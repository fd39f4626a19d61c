//! Audit log entries.
//!
//! Every authorization-relevant mutation — engagement transitions, grant
//! changes, detach operations, elevated cross-org access — produces an
//! entry. The log is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PrincipalId;

/// Who performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditActor {
    Principal(PrincipalId),
    /// Internal maintenance, migrations, invariant checks.
    System,
}

impl AuditActor {
    /// Stable string form used in storage.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Principal(id) => format!("principal:{id}"),
            Self::System => "system".to_string(),
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "system" {
            return Some(Self::System);
        }
        s.strip_prefix("principal:")
            .map(|id| Self::Principal(PrincipalId::from(id)))
    }
}

/// The kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    EngagementTransition,
    CoachAssigned,
    CoachUnassigned,
    EdgeSet,
    EdgeRemoved,
    GrantSet,
    GrantCleared,
    EntitlementSet,
    RecordDetached,
    ElevatedAccess,
    InvariantViolation,
}

impl AuditKind {
    /// Stable string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EngagementTransition => "engagement_transition",
            Self::CoachAssigned => "coach_assigned",
            Self::CoachUnassigned => "coach_unassigned",
            Self::EdgeSet => "edge_set",
            Self::EdgeRemoved => "edge_removed",
            Self::GrantSet => "grant_set",
            Self::GrantCleared => "grant_cleared",
            Self::EntitlementSet => "entitlement_set",
            Self::RecordDetached => "record_detached",
            Self::ElevatedAccess => "elevated_access",
            Self::InvariantViolation => "invariant_violation",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "engagement_transition" => Some(Self::EngagementTransition),
            "coach_assigned" => Some(Self::CoachAssigned),
            "coach_unassigned" => Some(Self::CoachUnassigned),
            "edge_set" => Some(Self::EdgeSet),
            "edge_removed" => Some(Self::EdgeRemoved),
            "grant_set" => Some(Self::GrantSet),
            "grant_cleared" => Some(Self::GrantCleared),
            "entitlement_set" => Some(Self::EntitlementSet),
            "record_detached" => Some(Self::RecordDetached),
            "elevated_access" => Some(Self::ElevatedAccess),
            "invariant_violation" => Some(Self::InvariantViolation),
            _ => None,
        }
    }
}

/// One append-only audit entry. `before`/`after` hold state snapshots for
/// transitions; `details` carries action-specific context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by storage on append; 0 until persisted.
    #[serde(default)]
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: AuditActor,
    pub kind: AuditKind,
    /// Target entity type, e.g. `engagement`, `record`, `grant`.
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub before: Option<serde_json::Value>,
    #[serde(default)]
    pub after: Option<serde_json::Value>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    /// A new entry stamped with the current time.
    pub fn new(
        actor: AuditActor,
        kind: AuditKind,
        entity_type: &str,
        entity_id: &str,
    ) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            actor,
            kind,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            before: None,
            after: None,
            details: None,
        }
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
