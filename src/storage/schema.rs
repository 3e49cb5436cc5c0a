//! Database schema definitions.
//!
//! Two databases are involved: the canonical record store (rules, components,
//! issues) and the document store backing the search projection. Each has its
//! own DDL script; both are idempotent.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema of the canonical record store.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const RECORD_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- Rules: what raised an issue
CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository TEXT NOT NULL,
    rule_key TEXT NOT NULL,
    name TEXT,
    UNIQUE(repository, rule_key)
);

-- Components: projects are components whose project_id is their own id
CREATE TABLE IF NOT EXISTS components (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    project_id INTEGER
);

CREATE INDEX IF NOT EXISTS idx_components_project ON components(project_id);

-- Issues: the canonical records
CREATE TABLE IF NOT EXISTS issues (
    key TEXT PRIMARY KEY,
    rule_id INTEGER,
    component_id INTEGER,
    root_component_id INTEGER,
    status TEXT,
    resolution TEXT,
    severity TEXT,
    assignee TEXT,
    author_login TEXT,
    reporter TEXT,
    message TEXT,
    line INTEGER CHECK (line IS NULL OR line >= 0),
    effort_to_fix REAL,
    attributes TEXT,
    action_plan_key TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    closed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_issues_updated ON issues(updated_at, key);
CREATE INDEX IF NOT EXISTS idx_issues_root_component ON issues(root_component_id);
";

/// Schema of the document store.
///
/// Documents of every collection share one table; `parent_key` carries the
/// parent/child linkage and is indexed for the join in both directions.
pub const INDEX_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    parent_key TEXT,
    body TEXT NOT NULL,
    indexed_at INTEGER NOT NULL,
    PRIMARY KEY (collection, key)
);

CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(collection, parent_key);

-- Scalar sync state (watermark)
CREATE TABLE IF NOT EXISTS sync_state (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Run leases shared by every process opening this index
CREATE TABLE IF NOT EXISTS sync_lease (
    name TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
";

/// Apply the record-store schema.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_record_schema(conn: &Connection) -> Result<()> {
    apply(conn, RECORD_SCHEMA_SQL)
}

/// Apply the document-store schema.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_index_schema(conn: &Connection) -> Result<()> {
    apply(conn, INDEX_SCHEMA_SQL)
}

/// Run one DDL script with the shared pragmas.
///
/// Idempotent because all statements use `IF NOT EXISTS`.
fn apply(conn: &Connection, ddl: &str) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(ddl)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
