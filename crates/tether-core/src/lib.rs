//! # tether-core
//!
//! Foundation crate for the Tether access-control engine.
//! Defines all types, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;

// Re-export the most commonly used types at the crate root.
pub use config::EngineConfig;
pub use errors::{TetherError, TetherResult};
pub use models::{
    Action, Decision, DenyReason, Engagement, EngagementStatus, Role,
};
