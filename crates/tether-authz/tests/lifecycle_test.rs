//! Lifecycle tests: role gating on each transition, the legal-transition
//! table, conflict surfacing, and the audit trail of transitions.

use chrono::Utc;
use tether_authz::lifecycle;
use tether_core::errors::TetherError;
use tether_core::models::*;
use tether_storage::queries::{audit_ops, directory_ops};
use tether_storage::StorageEngine;

fn p(id: &str) -> PrincipalId {
    PrincipalId::from(id)
}

/// org-1 with an org admin and a manager; co-1 with a company admin.
fn seeded_engine() -> StorageEngine {
    let engine = StorageEngine::open_in_memory().unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let org = OrgId::from("org-1");
            directory_ops::insert_org(
                conn,
                &CoachingOrg {
                    id: org.clone(),
                    name: "org-1".to_string(),
                    created_at: Utc::now(),
                },
            )?;
            directory_ops::insert_company(
                conn,
                &MemberCompany {
                    id: CompanyId::from("co-1"),
                    name: "co-1".to_string(),
                    created_at: Utc::now(),
                },
            )?;
            for principal in ["org-admin", "manager", "coach-1", "co-admin", "site"] {
                directory_ops::insert_principal(
                    conn,
                    &Principal {
                        id: p(principal),
                        display_name: principal.to_string(),
                    },
                )?;
            }
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("org-admin"), Role::CoachingOrgAdmin, org.clone()),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("manager"), Role::CoachingManager, org.clone()),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("coach-1"), Role::Coach, org),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::company(p("co-admin"), Role::MemberCompanyAdmin, CompanyId::from("co-1")),
            )?;
            directory_ops::add_role_binding(conn, &RoleBinding::site_admin(p("site")))?;
            Ok(())
        })
        .unwrap();
    engine
}

fn propose(engine: &StorageEngine, actor: &str) -> tether_core::errors::TetherResult<Engagement> {
    engine.pool().writer.with_conn_sync(|conn| {
        lifecycle::propose(conn, &p(actor), &OrgId::from("org-1"), &CompanyId::from("co-1"))
    })
}

#[test]
fn either_party_admin_may_propose() {
    let engine = seeded_engine();
    assert_eq!(
        propose(&engine, "org-admin").unwrap().status,
        EngagementStatus::PendingAcceptance
    );
    assert_eq!(
        propose(&engine, "co-admin").unwrap().status,
        EngagementStatus::PendingAcceptance
    );
}

#[test]
fn coaches_may_not_propose() {
    let engine = seeded_engine();
    assert!(matches!(
        propose(&engine, "coach-1").unwrap_err(),
        TetherError::Forbidden { .. }
    ));
}

#[test]
fn only_company_admin_accepts() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();

    let denied = engine
        .pool()
        .writer
        .with_conn_sync(|conn| lifecycle::accept(conn, &p("org-admin"), &engagement.id));
    assert!(matches!(denied.unwrap_err(), TetherError::Forbidden { .. }));

    let accepted = engine
        .pool()
        .writer
        .with_conn_sync(|conn| lifecycle::accept(conn, &p("co-admin"), &engagement.id))
        .unwrap();
    assert_eq!(accepted.status, EngagementStatus::Active);
}

#[test]
fn suspend_resume_end_round() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            lifecycle::accept(conn, &p("co-admin"), &engagement.id)?;
            let suspended = lifecycle::suspend(conn, &p("org-admin"), &engagement.id)?;
            assert_eq!(suspended.status, EngagementStatus::Suspended);

            let resumed = lifecycle::resume(conn, &p("co-admin"), &engagement.id)?;
            assert_eq!(resumed.status, EngagementStatus::Active);

            let ended =
                lifecycle::end(conn, &p("site"), &engagement.id, EngagementStatus::Active)?;
            assert_eq!(ended.status, EngagementStatus::Ended);
            assert!(ended.ended_at.is_some());
            Ok(())
        })
        .unwrap();
}

#[test]
fn ended_is_permanent() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            lifecycle::accept(conn, &p("co-admin"), &engagement.id)?;
            lifecycle::end(conn, &p("org-admin"), &engagement.id, EngagementStatus::Active)?;

            // No transition out of Ended exists in the table.
            let err = lifecycle::transition(
                conn,
                &p("org-admin"),
                &engagement.id,
                EngagementStatus::Ended,
                EngagementStatus::Active,
            )
            .unwrap_err();
            assert!(matches!(err, TetherError::IllegalTransition { .. }));
            Ok(())
        })
        .unwrap();
}

#[test]
fn stale_observation_surfaces_conflict() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            lifecycle::accept(conn, &p("co-admin"), &engagement.id)?;
            lifecycle::suspend(conn, &p("org-admin"), &engagement.id)?;

            // A second admin still believes it is active and tries to
            // suspend too; the compare-and-swap reports what actually won.
            let err = lifecycle::suspend(conn, &p("co-admin"), &engagement.id).unwrap_err();
            match err {
                TetherError::Conflict { expected, actual, .. } => {
                    assert_eq!(expected, EngagementStatus::Active);
                    assert_eq!(actual, EngagementStatus::Suspended);
                }
                other => panic!("expected Conflict, got {other:?}"),
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn transitions_are_audited_with_snapshots() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            lifecycle::accept(conn, &p("co-admin"), &engagement.id)?;

            let entries =
                audit_ops::entries_for_entity(conn, "engagement", engagement.id.as_str())?;
            // Propose + accept.
            assert_eq!(entries.len(), 2);
            let accept = &entries[1];
            assert_eq!(accept.kind, AuditKind::EngagementTransition);
            assert_eq!(accept.actor, AuditActor::Principal(p("co-admin")));
            assert_eq!(
                accept.before.as_ref().unwrap()["status"],
                "pending_acceptance"
            );
            assert_eq!(accept.after.as_ref().unwrap()["status"], "active");
            Ok(())
        })
        .unwrap();
}

#[test]
fn coach_assignment_requires_org_manager_or_admin() {
    let engine = seeded_engine();
    let engagement = propose(&engine, "org-admin").unwrap();
    engine
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let denied = lifecycle::assign_coach(conn, &p("coach-1"), &engagement.id, &p("coach-1"));
            assert!(matches!(denied.unwrap_err(), TetherError::Forbidden { .. }));

            lifecycle::assign_coach(conn, &p("manager"), &engagement.id, &p("coach-1"))?;
            let entries =
                audit_ops::entries_of_kind(conn, AuditKind::CoachAssigned)?;
            assert_eq!(entries.len(), 1);

            lifecycle::unassign_coach(conn, &p("org-admin"), &engagement.id, &p("coach-1"))?;
            Ok(())
        })
        .unwrap();
}
