//! Canonical record store.
//!
//! The record store is the transactional source of truth. Sync only needs
//! two reads from it (point lookup and "updated after"), captured by the
//! [`RecordStore`] trait; [`SqliteRecordStore`] adds the write helpers the
//! operator CLI and tests use to create records.

use crate::error::{Error, Result};
use crate::model::issue::{decode_attributes, encode_attributes};
use crate::model::{IssueRecord, IssueRow, RecordCursor, ResolvedKeys};
use crate::storage::schema::apply_record_schema;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Read access to canonical issue records.
pub trait RecordStore: Send + Sync {
    /// Fetch one record by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_by_key(&self, key: &str) -> Result<Option<IssueRow>>;

    /// Fetch up to `limit` records with `updated_at > since`, ascending by
    /// `(updated_at, key)`.
    ///
    /// The result is finite. To continue, reissue the call with `resume`
    /// set to the cursor of the last row received.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_updated_after(
        &self,
        since: i64,
        resume: Option<&RecordCursor>,
        limit: usize,
    ) -> Result<Vec<IssueRow>>;
}

const SELECT_ISSUE_ROW: &str = "SELECT i.key, i.rule_id, i.component_id, i.root_component_id,
        i.status, i.resolution, i.severity, i.assignee, i.author_login, i.reporter,
        i.message, i.line, i.effort_to_fix, i.attributes, i.action_plan_key,
        i.created_at, i.updated_at, i.closed_at,
        r.repository, r.rule_key, c.key, p.key
 FROM issues i
 LEFT JOIN rules r ON r.id = i.rule_id
 LEFT JOIN components c ON c.id = i.component_id
 LEFT JOIN components p ON p.id = i.root_component_id";

/// SQLite-backed record store.
#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open a record store at the given path, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a record store with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_record_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory record store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_record_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a rule, returning its id. Idempotent per `(repository, rule)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_rule(&self, repository: &str, rule_key: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO rules (repository, rule_key) VALUES (?1, ?2)",
            rusqlite::params![repository, rule_key],
        )?;
        let id = conn.query_row(
            "SELECT id FROM rules WHERE repository = ?1 AND rule_key = ?2",
            rusqlite::params![repository, rule_key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Register a project: a root component that is its own project.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_project(&self, key: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO components (key, project_id) VALUES (?1, NULL)",
            [key],
        )?;
        let id: i64 = conn.query_row("SELECT id FROM components WHERE key = ?1", [key], |row| {
            row.get(0)
        })?;
        conn.execute(
            "UPDATE components SET project_id = ?1 WHERE id = ?1",
            [id],
        )?;
        Ok(id)
    }

    /// Look up a project's id by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn project_id(&self, key: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .lock()
            .query_row(
                "SELECT id FROM components WHERE key = ?1 AND project_id = id",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Register a component under a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_component(&self, key: &str, project_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO components (key, project_id) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET project_id = excluded.project_id",
            rusqlite::params![key, project_id],
        )?;
        let id = conn.query_row("SELECT id FROM components WHERE key = ?1", [key], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    /// Insert or replace a canonical issue record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_issue(&self, issue: &IssueRecord) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO issues (key, rule_id, component_id, root_component_id, status, resolution, severity,
                                 assignee, author_login, reporter, message, line, effort_to_fix, attributes,
                                 action_plan_key, created_at, updated_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(key) DO UPDATE SET
               rule_id = excluded.rule_id,
               component_id = excluded.component_id,
               root_component_id = excluded.root_component_id,
               status = excluded.status,
               resolution = excluded.resolution,
               severity = excluded.severity,
               assignee = excluded.assignee,
               author_login = excluded.author_login,
               reporter = excluded.reporter,
               message = excluded.message,
               line = excluded.line,
               effort_to_fix = excluded.effort_to_fix,
               attributes = excluded.attributes,
               action_plan_key = excluded.action_plan_key,
               updated_at = excluded.updated_at,
               closed_at = excluded.closed_at",
            rusqlite::params![
                issue.key,
                issue.rule_id,
                issue.component_id,
                issue.root_component_id,
                issue.status,
                issue.resolution,
                issue.severity,
                issue.assignee,
                issue.author_login,
                issue.reporter,
                issue.message,
                issue.line,
                issue.effort_to_fix,
                encode_attributes(&issue.attributes),
                issue.action_plan_key,
                issue.created_at,
                issue.updated_at,
                issue.closed_at,
            ],
        )?;
        Ok(())
    }

    /// Transition an issue's status, advancing its update timestamp.
    ///
    /// The new `updated_at` is `now`, or one past the previous value if the
    /// clock has not moved, so every mutation is visible to incremental sync.
    ///
    /// # Errors
    ///
    /// Returns `Error::IssueNotFound` if no issue has this key.
    pub fn update_issue_status(
        &self,
        key: &str,
        status: &str,
        resolution: Option<&str>,
        now: i64,
    ) -> Result<()> {
        let closed_at = (status == "CLOSED").then_some(now);
        let rows = self.conn.lock().execute(
            "UPDATE issues
             SET status = ?1, resolution = ?2, closed_at = ?3,
                 updated_at = MAX(?4, updated_at + 1)
             WHERE key = ?5",
            rusqlite::params![status, resolution, closed_at, now, key],
        )?;

        if rows == 0 {
            return Err(Error::IssueNotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Number of canonical records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_issues(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl RecordStore for SqliteRecordStore {
    fn get_by_key(&self, key: &str) -> Result<Option<IssueRow>> {
        let conn = self.conn.lock();
        let sql = format!("{SELECT_ISSUE_ROW} WHERE i.key = ?1");
        let row = conn.query_row(&sql, [key], map_issue_row).optional()?;
        Ok(row)
    }

    fn find_updated_after(
        &self,
        since: i64,
        resume: Option<&RecordCursor>,
        limit: usize,
    ) -> Result<Vec<IssueRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{SELECT_ISSUE_ROW}
             WHERE i.updated_at > ?1
               AND (?2 IS NULL OR (i.updated_at, i.key) > (?2, ?3))
             ORDER BY i.updated_at ASC, i.key ASC
             LIMIT ?4"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![
                since,
                resume.map(|c| c.updated_at),
                resume.map(|c| c.key.as_str()),
                limit
            ],
            map_issue_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

/// Map a joined row to an [`IssueRow`].
fn map_issue_row(row: &rusqlite::Row) -> rusqlite::Result<IssueRow> {
    let attributes: Option<String> = row.get(13)?;
    let repository: Option<String> = row.get(18)?;
    let rule: Option<String> = row.get(19)?;

    let record = IssueRecord {
        key: row.get(0)?,
        rule_id: row.get(1)?,
        component_id: row.get(2)?,
        root_component_id: row.get(3)?,
        status: row.get(4)?,
        resolution: row.get(5)?,
        severity: row.get(6)?,
        assignee: row.get(7)?,
        author_login: row.get(8)?,
        reporter: row.get(9)?,
        message: row.get(10)?,
        line: row.get(11)?,
        effort_to_fix: row.get(12)?,
        attributes: decode_attributes(attributes.as_deref()),
        action_plan_key: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        closed_at: row.get(17)?,
    };

    let rule_key = match (repository, rule) {
        (Some(repo), Some(rule)) => Some(format!("{repo}:{rule}")),
        _ => None,
    };

    Ok(IssueRow {
        record,
        keys: ResolvedKeys {
            rule_key,
            component_key: row.get(20)?,
            root_component_key: row.get(21)?,
        },
    })
}
