//! Property tests: isolation invariants of the pure decision function
//! and exactness of the subtree walk against a naive reference.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use proptest::prelude::*;

use tether_authz::context::PrincipalSnapshot;
use tether_authz::decision::{decide, DecisionInput};
use tether_authz::resolver::subtree_coaches;
use tether_core::models::*;

fn any_status() -> impl Strategy<Value = EngagementStatus> {
    prop_oneof![
        Just(EngagementStatus::PendingAcceptance),
        Just(EngagementStatus::Active),
        Just(EngagementStatus::Suspended),
        Just(EngagementStatus::Ended),
    ]
}

fn any_coaching_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::CoachingOrgAdmin),
        Just(Role::CoachingManager),
        Just(Role::Coach),
    ]
}

fn snapshot(org: &str, role: Role) -> PrincipalSnapshot {
    PrincipalSnapshot {
        principal_id: PrincipalId::from("p-1"),
        acting_org: Some(OrgId::from(org)),
        org_roles: vec![role],
        company_roles: Vec::new(),
    }
}

fn engagement(org: &str, status: EngagementStatus) -> Engagement {
    Engagement {
        id: EngagementId::from("e-1"),
        org_id: OrgId::from(org),
        company_id: CompanyId::from("co-1"),
        status,
        linked_at: Utc::now(),
        ended_at: None,
        coaches: Vec::new(),
    }
}

fn record() -> ScopedRecord {
    ScopedRecord {
        id: RecordId::from("r-1"),
        company_id: CompanyId::from("co-1"),
        module: ModuleKey::from("tasks"),
        engagement_id: Some(EngagementId::from("e-1")),
        created_at: Utc::now(),
    }
}

fn any_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Read),
        Just(Action::Create),
        Just(Action::Update),
        Just(Action::Delete),
    ]
}

proptest! {
    /// No coaching principal ever passes on a non-active engagement,
    /// regardless of role, action, grants, or scope membership.
    #[test]
    fn inactive_engagements_never_allow(
        role in any_coaching_role(),
        action in any_action(),
        status in any_status(),
        in_scope in any::<bool>(),
        granted in any::<bool>(),
    ) {
        prop_assume!(status != EngagementStatus::Active);
        let principal = snapshot("org-1", role);
        let engagement = engagement("org-1", status);
        let record = record();
        let resolved = if in_scope {
            ResolvedScope::uniform([EngagementId::from("e-1")].into())
        } else {
            ResolvedScope::default()
        };
        let decision = decide(&DecisionInput {
            principal: &principal,
            action,
            record: &record,
            engagement: Some(&engagement),
            resolved: &resolved,
            non_scoped_create_granted: granted,
            module_vetoed: false,
        });
        prop_assert!(!decision.is_allow(), "status {status} allowed via {role:?}/{action}");
    }

    /// Acting in a different org than the engagement's never passes.
    #[test]
    fn cross_org_never_allows(
        role in any_coaching_role(),
        action in any_action(),
        status in any_status(),
    ) {
        let principal = snapshot("org-acting", role);
        let engagement = engagement("org-owner", status);
        let record = record();
        let resolved = ResolvedScope::uniform([EngagementId::from("e-1")].into());
        let decision = decide(&DecisionInput {
            principal: &principal,
            action,
            record: &record,
            engagement: Some(&engagement),
            resolved: &resolved,
            non_scoped_create_granted: false,
            module_vetoed: false,
        });
        prop_assert!(!decision.is_allow());
    }

    /// A vetoed module never produces an allow, on any path.
    #[test]
    fn veto_dominates_every_path(
        role in any_coaching_role(),
        action in any_action(),
        status in any_status(),
        with_company_role in any::<bool>(),
        granted in any::<bool>(),
    ) {
        let mut principal = snapshot("org-1", role);
        if with_company_role {
            principal
                .company_roles
                .push((CompanyId::from("co-1"), Role::MemberCompanyAdmin));
        }
        let engagement = engagement("org-1", status);
        let record = record();
        let resolved = ResolvedScope::uniform([EngagementId::from("e-1")].into());
        let decision = decide(&DecisionInput {
            principal: &principal,
            action,
            record: &record,
            engagement: Some(&engagement),
            resolved: &resolved,
            non_scoped_create_granted: granted,
            module_vetoed: true,
        });
        prop_assert!(!decision.is_allow());
    }

    /// The subtree walk returns exactly the naive transitive closure,
    /// minus the root, for arbitrary (even cyclic) edge sets.
    #[test]
    fn subtree_matches_naive_closure(
        edges in proptest::collection::vec((0u8..8, 0u8..8), 0..24),
        root in 0u8..8,
    ) {
        let name = |n: u8| PrincipalId::from(format!("p-{n}").as_str());
        let mut adjacency: BTreeMap<PrincipalId, BTreeSet<PrincipalId>> = BTreeMap::new();
        for (manager, coach) in &edges {
            adjacency.entry(name(*manager)).or_default().insert(name(*coach));
        }

        // Naive reference: depth-first closure with a visited set.
        let root_id = name(root);
        let mut expected: BTreeSet<PrincipalId> = BTreeSet::new();
        let mut stack: Vec<PrincipalId> = adjacency
            .get(&root_id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            if !expected.insert(node.clone()) {
                continue;
            }
            if let Some(children) = adjacency.get(&node) {
                stack.extend(children.iter().cloned());
            }
        }
        expected.remove(&root_id);

        let actual = subtree_coaches(&adjacency, &root_id, &OrgId::from("org-1"), 64).unwrap();
        prop_assert_eq!(actual, expected);
    }
}
