//! Scoped business records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CompanyId, EngagementId, ModuleKey, RecordId};

/// The authorization-relevant view of any business record (task, note,
/// finance line, ...). The full record lives with the calling module;
/// the engine only needs ownership, module, and scoping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedRecord {
    pub id: RecordId,
    /// The member company that owns the record.
    pub company_id: CompanyId,
    /// The product module the record belongs to, e.g. `finance_accounts`.
    pub module: ModuleKey,
    /// `None` = internal record, never visible to any coaching principal.
    /// `Some` = coaching-scoped to exactly one engagement.
    #[serde(default)]
    pub engagement_id: Option<EngagementId>,
    pub created_at: DateTime<Utc>,
}

impl ScopedRecord {
    /// Whether this record is internal to its company.
    pub fn is_internal(&self) -> bool {
        self.engagement_id.is_none()
    }
}
