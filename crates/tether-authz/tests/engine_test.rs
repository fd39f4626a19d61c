//! End-to-end tests through the async `AccessEngine`: status-driven
//! access, cross-org isolation, detach, grants, entitlements, the
//! elevated path, row filters, conflicts, and timeouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tether_authz::AccessEngine;
use tether_core::config::EngineConfig;
use tether_core::errors::TetherError;
use tether_core::models::*;
use tether_storage::queries::{audit_ops, directory_ops, engagement_ops, record_ops};

fn p(id: &str) -> PrincipalId {
    PrincipalId::from(id)
}

fn org() -> OrgId {
    OrgId::from("org-1")
}

fn company() -> CompanyId {
    CompanyId::from("co-1")
}

fn make_record(id: &str, module: &str, engagement: Option<&str>) -> ScopedRecord {
    ScopedRecord {
        id: RecordId::from(id),
        company_id: company(),
        module: ModuleKey::from(module),
        engagement_id: engagement.map(EngagementId::from),
        created_at: Utc::now(),
    }
}

fn seed_directory(conn: &rusqlite::Connection) -> tether_core::errors::TetherResult<()> {
    for org_id in ["org-1", "org-2"] {
        directory_ops::insert_org(
            conn,
            &CoachingOrg {
                id: OrgId::from(org_id),
                name: org_id.to_string(),
                created_at: Utc::now(),
            },
        )?;
    }
    for company_id in ["co-1", "co-2"] {
        directory_ops::insert_company(
            conn,
            &MemberCompany {
                id: CompanyId::from(company_id),
                name: company_id.to_string(),
                created_at: Utc::now(),
            },
        )?;
    }
    for principal in ["org-admin", "coach-1", "coach-2", "co-admin", "co-user", "site"] {
        directory_ops::insert_principal(
            conn,
            &Principal {
                id: p(principal),
                display_name: principal.to_string(),
            },
        )?;
    }
    Ok(())
}

/// org-1 serving co-1 with engagement e-1 (active, coach-1 assigned),
/// plus a second org with its own coach, a company admin, and a site
/// admin.
fn seeded_engine() -> AccessEngine {
    let engine = AccessEngine::open_in_memory(EngineConfig::default()).unwrap();
    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            seed_directory(conn)?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("org-admin"), Role::CoachingOrgAdmin, org()),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("coach-1"), Role::Coach, org()),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("coach-2"), Role::Coach, OrgId::from("org-2")),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::company(p("co-admin"), Role::MemberCompanyAdmin, company()),
            )?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::company(p("co-user"), Role::MemberCompanyUser, company()),
            )?;
            directory_ops::add_role_binding(conn, &RoleBinding::site_admin(p("site")))?;

            engagement_ops::insert_engagement(
                conn,
                &Engagement {
                    id: EngagementId::from("e-1"),
                    org_id: org(),
                    company_id: company(),
                    status: EngagementStatus::Active,
                    linked_at: Utc::now(),
                    ended_at: None,
                    coaches: vec![p("coach-1")],
                },
            )?;
            Ok(())
        })
        .unwrap();
    engine
}

fn insert_record(engine: &AccessEngine, record: &ScopedRecord) {
    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| record_ops::insert_record(conn, record))
        .unwrap();
}

async fn coach_reads(engine: &AccessEngine, record: &RecordId) -> Decision {
    engine
        .decide(&p("coach-1"), Some(&org()), Action::Read, record)
        .await
        .unwrap()
}

// ── Status drives access ─────────────────────────────────────────────────

#[tokio::test]
async fn coach_access_follows_engagement_status() {
    let engine = seeded_engine();
    let record = make_record("r-1", "tasks", Some("e-1"));
    insert_record(&engine, &record);

    assert!(coach_reads(&engine, &record.id).await.is_allow());

    engine
        .suspend_engagement(&p("org-admin"), &EngagementId::from("e-1"))
        .await
        .unwrap();
    assert_eq!(
        coach_reads(&engine, &record.id).await.deny_reason(),
        Some(DenyReason::InactiveEngagement)
    );

    engine
        .resume_engagement(&p("co-admin"), &EngagementId::from("e-1"))
        .await
        .unwrap();
    assert!(coach_reads(&engine, &record.id).await.is_allow());

    engine
        .end_engagement(&p("co-admin"), &EngagementId::from("e-1"), EngagementStatus::Active)
        .await
        .unwrap();
    assert_eq!(
        coach_reads(&engine, &record.id).await.deny_reason(),
        Some(DenyReason::InactiveEngagement)
    );

    // The company keeps full access to its own record throughout.
    let company_view = engine
        .decide(&p("co-user"), None, Action::Read, &record.id)
        .await
        .unwrap();
    assert!(company_view.is_allow());
}

#[tokio::test]
async fn pending_engagement_grants_nothing() {
    let engine = seeded_engine();
    let pending = engine
        .propose_engagement(&p("org-admin"), &org(), &company())
        .await
        .unwrap();
    engine
        .assign_coach(&p("org-admin"), &pending.id, &p("coach-1"))
        .await
        .unwrap();

    let record = make_record("r-pending", "tasks", Some(pending.id.as_str()));
    insert_record(&engine, &record);

    // Assignment alone is never sufficient.
    assert_eq!(
        coach_reads(&engine, &record.id).await.deny_reason(),
        Some(DenyReason::InactiveEngagement)
    );

    engine
        .accept_engagement(&p("co-admin"), &pending.id)
        .await
        .unwrap();
    assert!(coach_reads(&engine, &record.id).await.is_allow());
}

#[tokio::test]
async fn cross_org_principals_are_isolated() {
    let engine = seeded_engine();
    let record = make_record("r-x", "tasks", Some("e-1"));
    insert_record(&engine, &record);

    let decision = engine
        .decide(&p("coach-2"), Some(&OrgId::from("org-2")), Action::Read, &record.id)
        .await
        .unwrap();
    assert_eq!(decision.deny_reason(), Some(DenyReason::CrossOrg));
}

// ── Detach ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn detach_revokes_coaching_access_and_audits() {
    let engine = seeded_engine();
    let record = make_record("r-d", "notes", Some("e-1"));
    insert_record(&engine, &record);
    assert!(coach_reads(&engine, &record.id).await.is_allow());

    let detached_from = engine
        .detach_record(&p("co-admin"), None, &record.id)
        .await
        .unwrap();
    assert_eq!(detached_from, Some(EngagementId::from("e-1")));

    // The coach lost the record; the company did not.
    assert_eq!(
        coach_reads(&engine, &record.id).await.deny_reason(),
        Some(DenyReason::NonScopedForbidden)
    );
    let company_view = engine
        .decide(&p("co-admin"), None, Action::Read, &record.id)
        .await
        .unwrap();
    assert!(company_view.is_allow());

    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let entries = audit_ops::entries_of_kind(conn, AuditKind::RecordDetached)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].entity_id, "r-d");

            let history = record_ops::history_for_record(conn, &RecordId::from("r-d"))?;
            assert_eq!(history.len(), 1);
            assert!(history[0].detached_at.is_some());
            Ok(())
        })
        .unwrap();
}

// ── Grants ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_scoped_create_needs_a_grant_on_an_active_engagement() {
    let engine = seeded_engine();
    let candidate = make_record("r-new", "tasks", None);

    let denied = engine
        .create_record(&p("coach-1"), Some(&org()), &candidate)
        .await
        .unwrap_err();
    assert!(matches!(denied, TetherError::Forbidden { .. }));

    engine
        .set_grant(
            &p("org-admin"),
            &EngagementId::from("e-1"),
            &p("coach-1"),
            Capability::AllowNonScopedCreate,
            true,
        )
        .await
        .unwrap();
    engine
        .create_record(&p("coach-1"), Some(&org()), &candidate)
        .await
        .unwrap();

    // Suspension nullifies the grant without deleting it.
    engine
        .suspend_engagement(&p("org-admin"), &EngagementId::from("e-1"))
        .await
        .unwrap();
    let candidate2 = make_record("r-new-2", "tasks", None);
    let denied = engine
        .create_record(&p("coach-1"), Some(&org()), &candidate2)
        .await
        .unwrap_err();
    assert!(matches!(denied, TetherError::Forbidden { .. }));
}

#[tokio::test]
async fn grant_writes_require_an_admin_and_are_audited() {
    let engine = seeded_engine();
    let denied = engine
        .set_grant(
            &p("coach-1"),
            &EngagementId::from("e-1"),
            &p("coach-1"),
            Capability::AllowNonScopedCreate,
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(denied, TetherError::Forbidden { .. }));

    engine
        .set_grant(
            &p("co-admin"),
            &EngagementId::from("e-1"),
            &p("coach-1"),
            Capability::AllowNonScopedCreate,
            true,
        )
        .await
        .unwrap();
    engine
        .clear_grant(
            &p("co-admin"),
            &EngagementId::from("e-1"),
            &p("coach-1"),
            Capability::AllowNonScopedCreate,
        )
        .await
        .unwrap();

    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            assert_eq!(audit_ops::entries_of_kind(conn, AuditKind::GrantSet)?.len(), 1);
            assert_eq!(audit_ops::entries_of_kind(conn, AuditKind::GrantCleared)?.len(), 1);
            Ok(())
        })
        .unwrap();
}

// ── Entitlements ─────────────────────────────────────────────────────────

#[tokio::test]
async fn entitlement_veto_overrides_everyone() {
    let engine = seeded_engine();
    let record = make_record("r-fin", "finance_accounts", Some("e-1"));
    insert_record(&engine, &record);
    assert!(coach_reads(&engine, &record.id).await.is_allow());

    engine
        .set_entitlement(
            &AuditActor::Principal(p("site")),
            &ModuleKey::from("finance_accounts"),
            EntitlementScope::Company(company()),
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        coach_reads(&engine, &record.id).await.deny_reason(),
        Some(DenyReason::EntitlementVetoed)
    );
    // The veto binds the company itself too.
    let company_view = engine
        .decide(&p("co-admin"), None, Action::Read, &record.id)
        .await
        .unwrap();
    assert_eq!(company_view.deny_reason(), Some(DenyReason::EntitlementVetoed));
}

#[tokio::test]
async fn entitlement_writes_require_site_admin() {
    let engine = seeded_engine();
    let denied = engine
        .set_entitlement(
            &AuditActor::Principal(p("org-admin")),
            &ModuleKey::from("tasks"),
            EntitlementScope::Org(org()),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(denied, TetherError::Forbidden { .. }));

    engine
        .set_entitlement(
            &AuditActor::System,
            &ModuleKey::from("tasks"),
            EntitlementScope::Org(org()),
            false,
        )
        .await
        .unwrap();
    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let entries = audit_ops::entries_of_kind(conn, AuditKind::EntitlementSet)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].actor, AuditActor::System);
            Ok(())
        })
        .unwrap();
}

// ── Elevated path ────────────────────────────────────────────────────────

#[tokio::test]
async fn site_admins_pass_only_through_the_elevated_path() {
    let engine = seeded_engine();
    let record = make_record("r-e", "tasks", Some("e-1"));
    insert_record(&engine, &record);

    // The normal path resolves nothing for a site admin.
    let normal = engine
        .decide(&p("site"), None, Action::Read, &record.id)
        .await
        .unwrap();
    assert!(!normal.is_allow());

    let elevated = engine
        .elevated_decide(&p("site"), Action::Read, &record.id, "support ticket 4711")
        .await
        .unwrap();
    assert!(elevated.is_allow());

    // Non-admins cannot use the path at all.
    let denied = engine
        .elevated_decide(&p("coach-1"), Action::Read, &record.id, "curiosity")
        .await
        .unwrap_err();
    assert!(matches!(denied, TetherError::Forbidden { .. }));

    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let entries = audit_ops::entries_of_kind(conn, AuditKind::ElevatedAccess)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(
                entries[0].details.as_ref().unwrap()["justification"],
                "support ticket 4711"
            );
            Ok(())
        })
        .unwrap();
}

// ── Row filters ──────────────────────────────────────────────────────────

#[tokio::test]
async fn row_filter_matches_exactly_the_visible_rows() {
    let engine = seeded_engine();
    let pending = engine
        .propose_engagement(&p("org-admin"), &org(), &company())
        .await
        .unwrap();

    let visible = make_record("r-visible", "tasks", Some("e-1"));
    let inactive = make_record("r-inactive", "tasks", Some(pending.id.as_str()));
    let internal = make_record("r-internal", "tasks", None);
    let other_module = make_record("r-notes", "notes", Some("e-1"));
    for record in [&visible, &inactive, &internal, &other_module] {
        insert_record(&engine, record);
    }

    let filter = engine
        .row_filter(&p("coach-1"), Some(&org()), &ModuleKey::from("tasks"))
        .await
        .unwrap();
    assert!(filter.matches(&visible));
    assert!(!filter.matches(&inactive));
    assert!(!filter.matches(&internal));
    assert!(!filter.matches(&other_module));

    // The SQL rendering selects the same rows.
    let (predicate, params) = filter.sql_predicate();
    let ids: Vec<String> = engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let sql = format!("SELECT record_id FROM scoped_records WHERE {predicate} ORDER BY record_id");
            let mut stmt = conn.prepare(&sql).unwrap();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))
                .unwrap();
            Ok(rows.collect::<Result<Vec<String>, _>>().unwrap())
        })
        .unwrap();
    assert_eq!(ids, vec!["r-visible".to_string()]);

    // The company admin sees all of the company's rows in the module.
    let company_filter = engine
        .row_filter(&p("co-admin"), None, &ModuleKey::from("tasks"))
        .await
        .unwrap();
    assert!(company_filter.matches(&visible));
    assert!(company_filter.matches(&inactive));
    assert!(company_filter.matches(&internal));
}

// ── Concurrency and availability ─────────────────────────────────────────

#[tokio::test]
async fn losing_transition_surfaces_conflict() {
    let engine = seeded_engine();
    engine
        .suspend_engagement(&p("org-admin"), &EngagementId::from("e-1"))
        .await
        .unwrap();

    let err = engine
        .suspend_engagement(&p("co-admin"), &EngagementId::from("e-1"))
        .await
        .unwrap_err();
    match err {
        TetherError::Conflict { expected, actual, .. } => {
            assert_eq!(expected, EngagementStatus::Active);
            assert_eq!(actual, EngagementStatus::Suspended);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_store_surfaces_unavailable() {
    let config = EngineConfig {
        op_timeout_ms: 100,
        ..EngineConfig::default()
    };
    let engine = Arc::new(AccessEngine::open_in_memory(config).unwrap());
    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            seed_directory(conn)?;
            directory_ops::add_role_binding(
                conn,
                &RoleBinding::coaching(p("org-admin"), Role::CoachingOrgAdmin, org()),
            )
        })
        .unwrap();

    // Hold the write connection hostage well past the timeout.
    let blocker = Arc::clone(&engine);
    let handle = std::thread::spawn(move || {
        blocker
            .storage()
            .pool()
            .writer
            .with_conn_sync(|_conn| {
                std::thread::sleep(Duration::from_millis(600));
                Ok(())
            })
            .unwrap();
    });
    // Give the blocker time to take the lock.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = engine
        .propose_engagement(&p("org-admin"), &org(), &company())
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Unavailable { .. }));
    assert!(err.is_retryable());

    handle.join().unwrap();
}

// ── Corruption invariant ─────────────────────────────────────────────────

#[tokio::test]
async fn company_mismatch_fails_loudly_and_is_audited() {
    let engine = seeded_engine();
    // e-1 serves co-1; a record claiming co-2 but scoped to e-1 is
    // corrupt and must never produce a decision.
    let mut record = make_record("r-corrupt", "tasks", Some("e-1"));
    record.company_id = CompanyId::from("co-2");
    insert_record(&engine, &record);

    let err = engine
        .decide(&p("coach-1"), Some(&org()), Action::Read, &record.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Invariant(_)));

    engine
        .storage()
        .pool()
        .writer
        .with_conn_sync(|conn| {
            let entries = audit_ops::entries_of_kind(conn, AuditKind::InvariantViolation)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].entity_id, "r-corrupt");
            Ok(())
        })
        .unwrap();
}
