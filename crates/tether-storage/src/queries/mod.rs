//! Query modules, one per table family.

pub mod audit_ops;
pub mod directory_ops;
pub mod engagement_ops;
pub mod entitlement_ops;
pub mod grant_ops;
pub mod hierarchy_ops;
pub mod record_ops;
