//! v001: Core tables — directory, engagements, coach assignments,
//! management hierarchy, scoped records, grants, entitlements, and the
//! append-only record/engagement association history.

use rusqlite::Connection;

use tether_core::errors::TetherResult;

use crate::to_storage_err;

/// Run the v001 migration.
pub fn migrate(conn: &Connection) -> TetherResult<()> {
    tracing::info!("v001: creating core access-control tables");

    conn.execute_batch(
        "
        -- Tenants
        CREATE TABLE IF NOT EXISTS coaching_orgs (
            org_id     TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS member_companies (
            company_id TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Users and their per-context roles
        CREATE TABLE IF NOT EXISTS principals (
            principal_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL
        );

        -- Scope columns are NULL outside their context (coaching bindings
        -- carry no company_id, company bindings no org_id, site-admin
        -- neither). NULLs compare distinct inside a unique constraint, so
        -- identity is enforced through the COALESCE index below rather
        -- than a primary key; INSERT OR REPLACE conflicts against it.
        CREATE TABLE IF NOT EXISTS role_bindings (
            principal_id TEXT NOT NULL,
            role         TEXT NOT NULL,
            org_id       TEXT,
            company_id   TEXT,
            FOREIGN KEY (principal_id) REFERENCES principals(principal_id),
            FOREIGN KEY (org_id) REFERENCES coaching_orgs(org_id),
            FOREIGN KEY (company_id) REFERENCES member_companies(company_id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_identity
            ON role_bindings(principal_id, role, COALESCE(org_id, ''), COALESCE(company_id, ''));
        CREATE INDEX IF NOT EXISTS idx_bindings_org ON role_bindings(org_id);

        -- Engagements: never physically deleted
        CREATE TABLE IF NOT EXISTS engagements (
            engagement_id TEXT PRIMARY KEY,
            org_id        TEXT NOT NULL,
            company_id    TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending_acceptance',
            linked_at     TEXT NOT NULL,
            ended_at      TEXT,
            FOREIGN KEY (org_id) REFERENCES coaching_orgs(org_id),
            FOREIGN KEY (company_id) REFERENCES member_companies(company_id)
        );

        CREATE INDEX IF NOT EXISTS idx_engagements_org ON engagements(org_id, status);
        CREATE INDEX IF NOT EXISTS idx_engagements_company ON engagements(company_id);

        CREATE TABLE IF NOT EXISTS engagement_coaches (
            engagement_id TEXT NOT NULL,
            coach_id      TEXT NOT NULL,
            assigned_at   TEXT NOT NULL,
            PRIMARY KEY (engagement_id, coach_id),
            FOREIGN KEY (engagement_id) REFERENCES engagements(engagement_id),
            FOREIGN KEY (coach_id) REFERENCES principals(principal_id)
        );

        CREATE INDEX IF NOT EXISTS idx_coaches_coach ON engagement_coaches(coach_id);

        -- Management forest: the primary key enforces at most one direct
        -- manager per (org, coach).
        CREATE TABLE IF NOT EXISTS management_edges (
            org_id     TEXT NOT NULL,
            manager_id TEXT NOT NULL,
            coach_id   TEXT NOT NULL,
            PRIMARY KEY (org_id, coach_id),
            FOREIGN KEY (org_id) REFERENCES coaching_orgs(org_id),
            FOREIGN KEY (manager_id) REFERENCES principals(principal_id),
            FOREIGN KEY (coach_id) REFERENCES principals(principal_id)
        );

        CREATE INDEX IF NOT EXISTS idx_edges_manager ON management_edges(org_id, manager_id);

        -- Business records, reduced to their authorization-relevant view.
        -- coaching_engagement_id NULL = internal record.
        CREATE TABLE IF NOT EXISTS scoped_records (
            record_id              TEXT PRIMARY KEY,
            company_id             TEXT NOT NULL,
            module                 TEXT NOT NULL,
            coaching_engagement_id TEXT,
            created_at             TEXT NOT NULL,
            FOREIGN KEY (company_id) REFERENCES member_companies(company_id),
            FOREIGN KEY (coaching_engagement_id) REFERENCES engagements(engagement_id)
        );

        CREATE INDEX IF NOT EXISTS idx_records_engagement ON scoped_records(coaching_engagement_id);
        CREATE INDEX IF NOT EXISTS idx_records_company ON scoped_records(company_id, module);

        -- Append-only association history: attach inserts, detach stamps.
        CREATE TABLE IF NOT EXISTS record_engagement_history (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id     TEXT NOT NULL,
            engagement_id TEXT NOT NULL,
            attached_at   TEXT NOT NULL,
            detached_at   TEXT,
            detached_by   TEXT,
            FOREIGN KEY (record_id) REFERENCES scoped_records(record_id),
            FOREIGN KEY (engagement_id) REFERENCES engagements(engagement_id)
        );

        CREATE INDEX IF NOT EXISTS idx_history_record ON record_engagement_history(record_id);

        -- Explicit per-(engagement, coach) capability grants
        CREATE TABLE IF NOT EXISTS grants (
            engagement_id TEXT NOT NULL,
            coach_id      TEXT NOT NULL,
            capability    TEXT NOT NULL,
            enabled       INTEGER NOT NULL DEFAULT 0,
            granted_at    TEXT NOT NULL,
            granted_by    TEXT NOT NULL,
            PRIMARY KEY (engagement_id, coach_id, capability),
            FOREIGN KEY (engagement_id) REFERENCES engagements(engagement_id),
            FOREIGN KEY (coach_id) REFERENCES principals(principal_id)
        );

        -- Site-level entitlement overlay, independent of company toggles
        CREATE TABLE IF NOT EXISTS entitlements (
            module     TEXT NOT NULL,
            scope_kind TEXT NOT NULL,
            scope_id   TEXT NOT NULL,
            enabled    INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (module, scope_kind, scope_id)
        );
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    tracing::info!("v001: core tables created");
    Ok(())
}
