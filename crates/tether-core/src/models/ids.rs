//! Typed identifiers.
//!
//! Every id the engine touches is a distinct newtype over a string, so a
//! coaching-org id can never be passed where a member-company id is
//! expected. All of them serialize transparently as plain strings.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifier of a coaching organization (a tenant providing coaching).
    OrgId
}

string_id! {
    /// Identifier of a member company (a tenant receiving coaching).
    CompanyId
}

string_id! {
    /// Identifier of a user. A principal may hold roles in multiple
    /// organizations and companies at once; the id alone carries no scope.
    PrincipalId
}

string_id! {
    /// Identifier of an engagement between one coaching org and one
    /// member company.
    EngagementId
}

string_id! {
    /// Identifier of a business record (task, note, finance line, ...).
    RecordId
}

string_id! {
    /// Key of a product module, e.g. `tasks`, `notes`, `finance_accounts`.
    ModuleKey
}
