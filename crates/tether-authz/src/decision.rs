//! The scoping decision, as a pure function over snapshots.
//!
//! Evaluation order, short-circuiting on the first deny:
//! 1. non-scoped records: deny for coaching principals unless a grant
//!    permits non-scoped *creation* (reads are never relaxed)
//! 2. cross-org isolation
//! 3. engagement status (only `active` grants access)
//! 4. subtree membership (the resolver's engagement set)
//! 5. entitlement veto — last, unconditional, narrow-only
//!
//! Member-company principals bypass 1-4 for their own company's records
//! (engagement end is a visibility change, not a deletion) but remain
//! subject to the entitlement veto.

use tether_core::models::{
    Action, Decision, DenyReason, Engagement, ResolvedScope, ScopedRecord,
};

use crate::context::PrincipalSnapshot;

/// Everything `decide` looks at, snapshotted at call time. No field may
/// come from a cache that could straddle a transition boundary.
#[derive(Debug)]
pub struct DecisionInput<'a> {
    pub principal: &'a PrincipalSnapshot,
    pub action: Action,
    pub record: &'a ScopedRecord,
    /// Snapshot of the engagement the record is scoped to, if any.
    /// Must reflect the record's *current* `engagement_id`.
    pub engagement: Option<&'a Engagement>,
    /// The principal's resolved engagement sets in the acting org.
    pub resolved: &'a ResolvedScope,
    /// Whether a `allow_non_scoped_create` grant applies for this
    /// principal within an active, in-scope engagement context.
    pub non_scoped_create_granted: bool,
    /// Whether the entitlement overlay vetoes the record's module for the
    /// record's company (or the acting org).
    pub module_vetoed: bool,
}

/// Decide whether the principal may perform the action on the record.
pub fn decide(input: &DecisionInput<'_>) -> Decision {
    // Member-company principals: full access to their own company's
    // records regardless of engagement state, gated only by the
    // entitlement veto. Company-level role/module toggles are the
    // calling module's concern. Checked before the coaching path even
    // under a declared acting org; see `PrincipalSnapshot`.
    if input
        .principal
        .role_in_company(&input.record.company_id)
        .is_some()
    {
        if input.module_vetoed {
            return Decision::deny(DenyReason::EntitlementVetoed);
        }
        return Decision::allow();
    }

    // Everyone else goes through the coaching path, which requires a
    // declared acting org and at least one coaching role in it.
    if !input.principal.has_coaching_role() {
        return Decision::deny(DenyReason::NoCoachingRole);
    }

    // Step 1: non-scoped records. Never readable by coaching principals;
    // creation only under an explicit grant.
    let Some(engagement) = input.engagement else {
        if input.action == Action::Create && input.non_scoped_create_granted {
            if input.module_vetoed {
                return Decision::deny(DenyReason::EntitlementVetoed);
            }
            return Decision::allow();
        }
        return Decision::deny(DenyReason::NonScopedForbidden);
    };

    // Step 2: cross-org isolation. Hard invariant, checked before any
    // status or subtree reasoning leaks information about the engagement.
    if input.principal.acting_org.as_ref() != Some(&engagement.org_id) {
        return Decision::deny(DenyReason::CrossOrg);
    }

    // Step 3: only `active` is access-granting. Assignment alone — a
    // pending or suspended engagement — grants zero visibility.
    if !engagement.status.is_access_granting() {
        return Decision::deny(DenyReason::InactiveEngagement);
    }

    // Step 4: subtree membership.
    if !input.resolved.for_action(input.action).contains(&engagement.id) {
        return Decision::deny(DenyReason::OutOfSubtree);
    }

    // Step 5: entitlement veto. Unconditional; grants, roles, and company
    // toggles cannot bypass it.
    if input.module_vetoed {
        return Decision::deny(DenyReason::EntitlementVetoed);
    }

    Decision::allow_scoped(engagement.id.clone())
}
