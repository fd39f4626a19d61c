//! Row filters for list endpoints.
//!
//! A filter is built once per (principal, acting context, module) request
//! and applied to many rows, either in memory via [`RowFilter::matches`]
//! or pushed into SQL via [`RowFilter::sql_predicate`]. It encodes the
//! same semantics as the single-record decision: member-company access by
//! company, coaching access by active in-scope engagement, entitlement
//! vetoes removing rows outright. Non-scoped records never match through
//! the coaching path.

use std::collections::BTreeSet;

use rusqlite::Connection;
use tracing::debug;

use tether_core::errors::TetherResult;
use tether_core::models::{CompanyId, EngagementId, ModuleKey, ScopedRecord};

use tether_storage::queries::engagement_ops;

use crate::context::PrincipalSnapshot;
use crate::entitlements;
use crate::resolver;

/// A prebuilt predicate over scoped records for one module.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub module: ModuleKey,
    /// Companies the principal may see wholesale (member-company roles,
    /// minus vetoed ones).
    pub companies: BTreeSet<CompanyId>,
    /// Engagements the principal may see through the coaching path:
    /// resolved, currently active, and not vetoed.
    pub engagements: BTreeSet<EngagementId>,
}

impl RowFilter {
    /// Whether a record passes the filter.
    pub fn matches(&self, record: &ScopedRecord) -> bool {
        if record.module != self.module {
            return false;
        }
        if self.companies.contains(&record.company_id) {
            return true;
        }
        match &record.engagement_id {
            Some(id) => self.engagements.contains(id),
            None => false,
        }
    }

    /// Whether the filter can match anything at all. Callers short-circuit
    /// to an empty result instead of running a query that matches nothing.
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.engagements.is_empty()
    }

    /// Render the filter as a SQL predicate over the `scoped_records`
    /// columns, with positional parameters. An empty arm renders as a
    /// false constant so the predicate stays well-formed.
    pub fn sql_predicate(&self) -> (String, Vec<String>) {
        let mut params: Vec<String> = vec![self.module.as_str().to_string()];

        let company_arm = if self.companies.is_empty() {
            "1 = 0".to_string()
        } else {
            let placeholders = placeholder_list(params.len(), self.companies.len());
            params.extend(self.companies.iter().map(|c| c.as_str().to_string()));
            format!("company_id IN ({placeholders})")
        };

        let engagement_arm = if self.engagements.is_empty() {
            "1 = 0".to_string()
        } else {
            let placeholders = placeholder_list(params.len(), self.engagements.len());
            params.extend(self.engagements.iter().map(|e| e.as_str().to_string()));
            format!("coaching_engagement_id IN ({placeholders})")
        };

        let sql = format!("module = ?1 AND ({company_arm} OR {engagement_arm})");
        (sql, params)
    }
}

/// Build the filter from fresh snapshots. The engagement arm is limited
/// to active engagements at build time; a transition between build and
/// query can only over-restrict, never over-expose a just-deactivated
/// engagement beyond the row set already read.
pub fn build_row_filter(
    conn: &Connection,
    principal: &PrincipalSnapshot,
    module: &ModuleKey,
    max_depth: usize,
) -> TetherResult<RowFilter> {
    let mut companies = BTreeSet::new();
    for (company, _) in &principal.company_roles {
        if !entitlements::module_vetoed(conn, module, company, None)? {
            companies.insert(company.clone());
        }
    }

    let mut engagements = BTreeSet::new();
    if let Some(org) = &principal.acting_org {
        let resolved = resolver::resolve_scope(conn, &principal.principal_id, org, max_depth)?;
        for id in &resolved.read {
            let Some(engagement) = engagement_ops::get_engagement(conn, id)? else {
                continue;
            };
            if !engagement.status.is_access_granting() {
                continue;
            }
            if entitlements::module_vetoed(conn, module, &engagement.company_id, Some(org))? {
                continue;
            }
            engagements.insert(id.clone());
        }
    }

    debug!(
        principal = %principal.principal_id,
        module = %module,
        companies = companies.len(),
        engagements = engagements.len(),
        "row filter built"
    );
    Ok(RowFilter {
        module: module.clone(),
        companies,
        engagements,
    })
}

fn placeholder_list(offset: usize, count: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", offset + i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}
