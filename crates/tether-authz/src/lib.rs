//! # tether-authz
//!
//! The scoping decision engine. Combines the engagement store, the
//! role/hierarchy resolver, the grant registry, and the entitlement
//! overlay into allow/deny decisions and row-filter predicates, with an
//! append-only audit trail on every authorization-relevant mutation.
//!
//! The decision itself ([`decision::decide`]) is a pure function over
//! snapshots; everything stateful lives in the surrounding modules and
//! the async [`engine::AccessEngine`] facade.

pub mod context;
pub mod decision;
pub mod elevated;
pub mod engine;
pub mod entitlements;
pub mod filter;
pub mod grants;
pub mod hierarchy;
pub mod lifecycle;
pub mod resolver;

pub use engine::AccessEngine;
