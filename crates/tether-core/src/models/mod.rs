//! Domain models for the access-control engine.

pub mod audit;
pub mod decision;
pub mod directory;
pub mod engagement;
pub mod entitlement;
pub mod grant;
pub mod hierarchy;
pub mod ids;
pub mod record;

pub use audit::{AuditActor, AuditEntry, AuditKind};
pub use decision::{Action, Decision, DenyReason, ResolvedScope};
pub use directory::{CoachingOrg, MemberCompany, Principal, Role, RoleBinding};
pub use engagement::{Engagement, EngagementStatus};
pub use entitlement::{Entitlement, EntitlementScope};
pub use grant::{Capability, Grant};
pub use hierarchy::ManagementEdge;
pub use ids::{CompanyId, EngagementId, ModuleKey, OrgId, PrincipalId, RecordId};
pub use record::ScopedRecord;
