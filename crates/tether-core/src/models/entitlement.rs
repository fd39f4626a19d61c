//! Site-level entitlement overlay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CompanyId, ModuleKey, OrgId};

/// The scope an entitlement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntitlementScope {
    Company(CompanyId),
    Org(OrgId),
}

impl EntitlementScope {
    /// Stable (kind, id) pair used as the storage key.
    pub fn storage_key(&self) -> (&'static str, &str) {
        match self {
            Self::Company(id) => ("company", id.as_str()),
            Self::Org(id) => ("org", id.as_str()),
        }
    }
}

/// A (module, scope) capability maintained independently of any company's
/// self-service module toggles. `enabled = false` is an unconditional
/// veto; an absent row is no veto. An entitlement can only narrow a
/// decision, never widen one: company toggle and entitlement must both be
/// affirmative where applicable (pure intersection, never a union).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub module: ModuleKey,
    pub scope: EntitlementScope,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
