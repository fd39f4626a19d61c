//! AccessEngine — the async facade over storage and the decision path.
//!
//! All mutations funnel through the single write connection; engagement-
//! scoped mutations additionally serialize on a per-engagement async lock
//! so a transition and a grant change on the same engagement cannot
//! interleave. Every operation is bounded by the configured timeout; on
//! expiry the caller gets `Unavailable`, which is an error, never a deny.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{error, instrument};

use tether_core::config::EngineConfig;
use tether_core::errors::{InvariantViolation, StorageError, TetherError, TetherResult};
use tether_core::models::{
    Action, AuditActor, AuditEntry, AuditKind, Capability, CompanyId, Decision, Engagement,
    EngagementId, EngagementStatus, Entitlement, EntitlementScope, ManagementEdge, ModuleKey,
    OrgId, PrincipalId, RecordId, ResolvedScope, ScopedRecord,
};

use tether_storage::queries::{engagement_ops, record_ops};
use tether_storage::{audit, to_storage_err, StorageEngine};

use crate::context::PrincipalSnapshot;
use crate::decision::{decide, DecisionInput};
use crate::filter::{build_row_filter, RowFilter};
use crate::{elevated, entitlements, grants, hierarchy, lifecycle, resolver};

/// The access-control engine.
pub struct AccessEngine {
    storage: Arc<StorageEngine>,
    config: EngineConfig,
    /// Per-engagement async locks; created on first use and kept for the
    /// engine's lifetime (engagement rows are never deleted either).
    engagement_locks: DashMap<EngagementId, Arc<Mutex<()>>>,
}

impl AccessEngine {
    /// Open a file-backed engine.
    pub fn open(path: &Path, config: EngineConfig) -> TetherResult<Self> {
        let storage = StorageEngine::open_with_pool_size(path, config.read_pool_size)?;
        Ok(Self {
            storage: Arc::new(storage),
            config,
            engagement_locks: DashMap::new(),
        })
    }

    /// Open an in-memory engine (for testing).
    pub fn open_in_memory(config: EngineConfig) -> TetherResult<Self> {
        Ok(Self {
            storage: Arc::new(StorageEngine::open_in_memory()?),
            config,
            engagement_locks: DashMap::new(),
        })
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ----- engagement lifecycle -------------------------------------------

    /// Propose an engagement between an org and a company.
    #[instrument(skip(self))]
    pub async fn propose_engagement(
        &self,
        actor: &PrincipalId,
        org_id: &OrgId,
        company_id: &CompanyId,
    ) -> TetherResult<Engagement> {
        let (actor, org_id, company_id) = (actor.clone(), org_id.clone(), company_id.clone());
        self.with_writer("propose_engagement", move |conn| {
            lifecycle::propose(conn, &actor, &org_id, &company_id)
        })
        .await
    }

    /// Accept a pending engagement.
    #[instrument(skip(self))]
    pub async fn accept_engagement(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
    ) -> TetherResult<Engagement> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id) = (actor.clone(), id.clone());
        self.with_writer("accept_engagement", move |conn| {
            lifecycle::accept(conn, &actor, &id)
        })
        .await
    }

    /// Suspend an active engagement.
    #[instrument(skip(self))]
    pub async fn suspend_engagement(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
    ) -> TetherResult<Engagement> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id) = (actor.clone(), id.clone());
        self.with_writer("suspend_engagement", move |conn| {
            lifecycle::suspend(conn, &actor, &id)
        })
        .await
    }

    /// Resume a suspended engagement.
    #[instrument(skip(self))]
    pub async fn resume_engagement(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
    ) -> TetherResult<Engagement> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id) = (actor.clone(), id.clone());
        self.with_writer("resume_engagement", move |conn| {
            lifecycle::resume(conn, &actor, &id)
        })
        .await
    }

    /// End an engagement from the status the caller observed. A concurrent
    /// transition surfaces as `Conflict`.
    #[instrument(skip(self))]
    pub async fn end_engagement(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
        observed: EngagementStatus,
    ) -> TetherResult<Engagement> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id) = (actor.clone(), id.clone());
        self.with_writer("end_engagement", move |conn| {
            lifecycle::end(conn, &actor, &id, observed)
        })
        .await
    }

    /// Assign a coach to an engagement.
    #[instrument(skip(self))]
    pub async fn assign_coach(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
        coach_id: &PrincipalId,
    ) -> TetherResult<()> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id, coach_id) = (actor.clone(), id.clone(), coach_id.clone());
        self.with_writer("assign_coach", move |conn| {
            lifecycle::assign_coach(conn, &actor, &id, &coach_id)
        })
        .await
    }

    /// Remove a coach assignment.
    #[instrument(skip(self))]
    pub async fn unassign_coach(
        &self,
        actor: &PrincipalId,
        id: &EngagementId,
        coach_id: &PrincipalId,
    ) -> TetherResult<()> {
        let _guard = self.lock_for(id).lock_owned().await;
        let (actor, id, coach_id) = (actor.clone(), id.clone(), coach_id.clone());
        self.with_writer("unassign_coach", move |conn| {
            lifecycle::unassign_coach(conn, &actor, &id, &coach_id)
        })
        .await
    }

    // ----- hierarchy ------------------------------------------------------

    /// Set a manager -> coach edge. Cycle-closing edges are refused.
    #[instrument(skip(self, edge))]
    pub async fn set_management_edge(
        &self,
        actor: &PrincipalId,
        edge: &ManagementEdge,
    ) -> TetherResult<()> {
        let (actor, edge) = (actor.clone(), edge.clone());
        self.with_writer("set_management_edge", move |conn| {
            hierarchy::set_edge(conn, &actor, &edge)
        })
        .await
    }

    /// Remove the edge above a coach.
    #[instrument(skip(self))]
    pub async fn remove_management_edge(
        &self,
        actor: &PrincipalId,
        org_id: &OrgId,
        coach_id: &PrincipalId,
    ) -> TetherResult<()> {
        let (actor, org_id, coach_id) = (actor.clone(), org_id.clone(), coach_id.clone());
        self.with_writer("remove_management_edge", move |conn| {
            hierarchy::remove_edge(conn, &actor, &org_id, &coach_id)
        })
        .await
    }

    // ----- grants and entitlements ----------------------------------------

    /// Set (or overwrite) a grant on an engagement.
    #[instrument(skip(self))]
    pub async fn set_grant(
        &self,
        actor: &PrincipalId,
        engagement_id: &EngagementId,
        coach_id: &PrincipalId,
        capability: Capability,
        enabled: bool,
    ) -> TetherResult<()> {
        let _guard = self.lock_for(engagement_id).lock_owned().await;
        let (actor, engagement_id, coach_id) =
            (actor.clone(), engagement_id.clone(), coach_id.clone());
        self.with_writer("set_grant", move |conn| {
            grants::set_grant(conn, &actor, &engagement_id, &coach_id, capability, enabled)?;
            Ok(())
        })
        .await
    }

    /// Remove a grant, restoring the restrictive default.
    #[instrument(skip(self))]
    pub async fn clear_grant(
        &self,
        actor: &PrincipalId,
        engagement_id: &EngagementId,
        coach_id: &PrincipalId,
        capability: Capability,
    ) -> TetherResult<()> {
        let _guard = self.lock_for(engagement_id).lock_owned().await;
        let (actor, engagement_id, coach_id) =
            (actor.clone(), engagement_id.clone(), coach_id.clone());
        self.with_writer("clear_grant", move |conn| {
            grants::clear_grant(conn, &actor, &engagement_id, &coach_id, capability)
        })
        .await
    }

    /// Set an entitlement at company or org scope.
    #[instrument(skip(self))]
    pub async fn set_entitlement(
        &self,
        actor: &AuditActor,
        module: &ModuleKey,
        scope: EntitlementScope,
        enabled: bool,
    ) -> TetherResult<Entitlement> {
        let (actor, module) = (actor.clone(), module.clone());
        self.with_writer("set_entitlement", move |conn| {
            entitlements::set_entitlement(conn, &actor, &module, scope, enabled)
        })
        .await
    }

    // ----- records --------------------------------------------------------

    /// Create a record after an authorization decision on the candidate.
    /// A denial comes back as `Forbidden` carrying the deny reason.
    #[instrument(skip(self, record))]
    pub async fn create_record(
        &self,
        actor: &PrincipalId,
        acting_org: Option<&OrgId>,
        record: &ScopedRecord,
    ) -> TetherResult<()> {
        let max_depth = self.config.max_hierarchy_depth;
        let (actor, acting_org, record) = (actor.clone(), acting_org.cloned(), record.clone());
        self.with_writer("create_record", move |conn| {
            let decision =
                decide_on_conn(conn, &actor, acting_org.as_ref(), Action::Create, &record, max_depth)?;
            match decision {
                Decision::Allow { .. } => record_ops::insert_record(conn, &record),
                Decision::Deny { reason } => Err(TetherError::Forbidden {
                    actor: actor.to_string(),
                    reason: reason.to_string(),
                }),
            }
        })
        .await
    }

    /// Detach a record from its engagement. Authorized as an update on the
    /// record; the detach and its history stamp commit atomically and the
    /// operation is audited.
    #[instrument(skip(self))]
    pub async fn detach_record(
        &self,
        actor: &PrincipalId,
        acting_org: Option<&OrgId>,
        record_id: &RecordId,
    ) -> TetherResult<Option<EngagementId>> {
        let current = {
            let record_id = record_id.clone();
            self.with_reader("detach_record", move |conn| {
                record_ops::get_record(conn, &record_id)
            })
            .await?
        }
        .ok_or_else(|| TetherError::RecordNotFound { id: record_id.clone() })?;

        let guard = match &current.engagement_id {
            Some(engagement_id) => Some(self.lock_for(engagement_id).lock_owned().await),
            None => None,
        };

        let max_depth = self.config.max_hierarchy_depth;
        let (actor, acting_org, record_id) =
            (actor.clone(), acting_org.cloned(), record_id.clone());
        let result = self
            .with_writer("detach_record", move |conn| {
                // Re-read under the write lock; the pre-read only chose
                // which engagement lock to take.
                let record = record_ops::get_record(conn, &record_id)?
                    .ok_or_else(|| TetherError::RecordNotFound { id: record_id.clone() })?;

                let decision =
                    decide_on_conn(conn, &actor, acting_org.as_ref(), Action::Update, &record, max_depth)?;
                if let Decision::Deny { reason } = decision {
                    return Err(TetherError::Forbidden {
                        actor: actor.to_string(),
                        reason: reason.to_string(),
                    });
                }

                let detached_from = record_ops::detach_record(conn, &record_id, &actor)?;
                if let Some(engagement_id) = &detached_from {
                    let entry = AuditEntry::new(
                        AuditActor::Principal(actor.clone()),
                        AuditKind::RecordDetached,
                        "record",
                        record_id.as_str(),
                    )
                    .with_details(serde_json::json!({
                        "engagement": engagement_id.as_str(),
                    }));
                    audit::record_or_report(conn, &entry);
                }
                Ok(detached_from)
            })
            .await;
        drop(guard);
        result
    }

    // ----- decisions ------------------------------------------------------

    /// Decide whether a principal may perform an action on a record.
    /// Every call loads fresh snapshots; decisions are never cached.
    #[instrument(skip(self))]
    pub async fn decide(
        &self,
        actor: &PrincipalId,
        acting_org: Option<&OrgId>,
        action: Action,
        record_id: &RecordId,
    ) -> TetherResult<Decision> {
        let max_depth = self.config.max_hierarchy_depth;
        let (actor_c, acting_org_c, record_id_c) =
            (actor.clone(), acting_org.cloned(), record_id.clone());
        let result = self
            .with_reader("decide", move |conn| {
                let record = record_ops::get_record(conn, &record_id_c)?
                    .ok_or_else(|| TetherError::RecordNotFound { id: record_id_c.clone() })?;
                decide_on_conn(conn, &actor_c, acting_org_c.as_ref(), action, &record, max_depth)
            })
            .await;

        if let Err(TetherError::Invariant(violation)) = &result {
            error!(record = %record_id, %violation, "invariant violation during decision");
            if self.config.audit_invariant_violations {
                let entry = AuditEntry::new(
                    AuditActor::Principal(actor.clone()),
                    AuditKind::InvariantViolation,
                    "record",
                    record_id.as_str(),
                )
                .with_details(serde_json::json!({ "violation": violation.to_string() }));
                self.with_writer("audit_invariant", move |conn| {
                    audit::record_or_report(conn, &entry);
                    Ok(())
                })
                .await?;
            }
        }
        result
    }

    /// Decide an action on a record through the elevated site-admin path.
    #[instrument(skip(self))]
    pub async fn elevated_decide(
        &self,
        actor: &PrincipalId,
        action: Action,
        record_id: &RecordId,
        justification: &str,
    ) -> TetherResult<Decision> {
        // Goes through the writer: every elevated call writes audit.
        let (actor, record_id, justification) =
            (actor.clone(), record_id.clone(), justification.to_string());
        self.with_writer("elevated_decide", move |conn| {
            elevated::elevated_decide(conn, &actor, action, &record_id, &justification)
        })
        .await
    }

    /// Resolve the engagement scope for a principal in one organization.
    #[instrument(skip(self))]
    pub async fn resolve_scope(
        &self,
        principal_id: &PrincipalId,
        org_id: &OrgId,
    ) -> TetherResult<ResolvedScope> {
        let max_depth = self.config.max_hierarchy_depth;
        let (principal_id, org_id) = (principal_id.clone(), org_id.clone());
        self.with_reader("resolve_scope", move |conn| {
            resolver::resolve_scope(conn, &principal_id, &org_id, max_depth)
        })
        .await
    }

    /// Build a row filter for list queries over one module.
    #[instrument(skip(self))]
    pub async fn row_filter(
        &self,
        actor: &PrincipalId,
        acting_org: Option<&OrgId>,
        module: &ModuleKey,
    ) -> TetherResult<RowFilter> {
        let max_depth = self.config.max_hierarchy_depth;
        let (actor, acting_org, module) = (actor.clone(), acting_org.cloned(), module.clone());
        self.with_reader("row_filter", move |conn| {
            let snapshot = PrincipalSnapshot::load(conn, &actor, acting_org.as_ref())?;
            build_row_filter(conn, &snapshot, &module, max_depth)
        })
        .await
    }

    // ----- plumbing -------------------------------------------------------

    fn lock_for(&self, id: &EngagementId) -> Arc<Mutex<()>> {
        self.engagement_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn with_writer<F, T>(&self, operation: &'static str, f: F) -> TetherResult<T>
    where
        F: FnOnce(&Connection) -> TetherResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = Duration::from_millis(self.config.op_timeout_ms);
        match tokio::time::timeout(timeout, self.storage.pool().writer.with_conn(f)).await {
            Ok(result) => result,
            Err(_) => Err(TetherError::Unavailable {
                operation: operation.to_string(),
                timeout_ms: self.config.op_timeout_ms,
            }),
        }
    }

    async fn with_reader<F, T>(&self, operation: &'static str, f: F) -> TetherResult<T>
    where
        F: FnOnce(&Connection) -> TetherResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let task = tokio::task::spawn_blocking(move || storage.with_reader(f));
        let timeout = Duration::from_millis(self.config.op_timeout_ms);
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => {
                joined.map_err(|e| to_storage_err(format!("blocking task failed: {e}")))?
            }
            Err(_) => Err(TetherError::Unavailable {
                operation: operation.to_string(),
                timeout_ms: self.config.op_timeout_ms,
            }),
        }
    }
}

/// The full decision path on one connection: fresh principal snapshot,
/// fresh record and engagement rows, resolved scope, grant and veto
/// lookups, then the pure decision. Also where the record/engagement
/// company mismatch invariant is enforced.
fn decide_on_conn(
    conn: &Connection,
    actor: &PrincipalId,
    acting_org: Option<&OrgId>,
    action: Action,
    record: &ScopedRecord,
    max_depth: usize,
) -> TetherResult<Decision> {
    let principal = PrincipalSnapshot::load(conn, actor, acting_org)?;

    let engagement = match &record.engagement_id {
        Some(id) => {
            let engagement = engagement_ops::get_engagement(conn, id)?.ok_or_else(|| {
                TetherError::Storage(StorageError::CorruptionDetected {
                    details: format!("record {} scoped to missing engagement {id}", record.id),
                })
            })?;
            if engagement.company_id != record.company_id {
                return Err(TetherError::Invariant(InvariantViolation::OrgMismatch {
                    record: record.id.clone(),
                    company: record.company_id.clone(),
                    engagement: id.clone(),
                    engagement_org: engagement.org_id.clone(),
                }));
            }
            Some(engagement)
        }
        None => None,
    };

    let resolved = match acting_org {
        Some(org) => resolver::resolve_scope(conn, actor, org, max_depth)?,
        None => ResolvedScope::default(),
    };

    // A non-scoped create is relaxed only by a grant held on an active,
    // in-scope engagement serving the record's company.
    let mut non_scoped_create_granted = false;
    if record.engagement_id.is_none() && action == Action::Create {
        for id in &resolved.write {
            let Some(candidate) = engagement_ops::get_engagement(conn, id)? else {
                continue;
            };
            if candidate.company_id == record.company_id
                && grants::non_scoped_create_allowed(conn, &candidate, actor)?
            {
                non_scoped_create_granted = true;
                break;
            }
        }
    }

    let module_vetoed =
        entitlements::module_vetoed(conn, &record.module, &record.company_id, acting_org)?;

    let input = DecisionInput {
        principal: &principal,
        action,
        record,
        engagement: engagement.as_ref(),
        resolved: &resolved,
        non_scoped_create_granted,
        module_vetoed,
    };
    Ok(decide(&input))
}
