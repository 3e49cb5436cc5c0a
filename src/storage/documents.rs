//! Generic document store with parent/child collections.
//!
//! Collections are configuration, not types: each is a [`CollectionSchema`]
//! declaring its field kinds, an optional parent collection and an optional
//! routing field from which a child's parent key is taken. Every child write
//! carries its parent key; `HasParent`/`HasChild` filters join on it.
//!
//! # Write modes
//!
//! - `Replace` overwrites the stored body wholesale.
//! - `Merge` creates the document or JSON-patches the stored body.
//!
//! # Bulk writes
//!
//! `bulk_upsert` validates every write first. Writes that fail validation
//! are rejected individually; the rest commit in one transaction, which is
//! the visibility boundary of the batch.

use crate::error::{Error, Result};
use crate::storage::filter::{compile, Filter};
use crate::storage::schema::apply_index_schema;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Declared type of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Exact-match string.
    Keyword,
    /// Free text.
    Text,
    Integer,
    Float,
    /// Unix milliseconds.
    Date,
    Boolean,
    /// Nested key/value object.
    Object,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Keyword | Self::Text => value.is_string(),
            Self::Integer | Self::Date => value.is_i64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
}

/// Declarative definition of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: BTreeMap<String, FieldSpec>,
    /// Collection whose documents are parents of this one's.
    pub parent: Option<String>,
    /// Field holding the parent key when a write does not pass one.
    pub routing_field: Option<String>,
}

impl CollectionSchema {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
            parent: None,
            routing_field: None,
        }
    }

    /// Declare an optional field.
    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields
            .insert(name.to_string(), FieldSpec { kind, required: false });
        self
    }

    /// Declare a field that must be present and non-null.
    #[must_use]
    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields
            .insert(name.to_string(), FieldSpec { kind, required: true });
        self
    }

    /// Make this a child collection of `parent`.
    #[must_use]
    pub fn child_of(mut self, parent: &str, routing_field: Option<&str>) -> Self {
        self.parent = Some(parent.to_string());
        self.routing_field = routing_field.map(str::to_string);
        self
    }

    /// Check a body against the declared fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Schema` naming the first offending field.
    pub fn validate(&self, key: &str, body: &Value) -> Result<()> {
        let schema_err = |reason: String| Error::Schema {
            key: key.to_string(),
            reason,
        };

        if key.is_empty() {
            return Err(schema_err("empty document key".to_string()));
        }
        let Some(object) = body.as_object() else {
            return Err(schema_err("document body is not an object".to_string()));
        };

        if let Some(undeclared) = object.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(schema_err(format!(
                "field '{undeclared}' is not declared in '{}'",
                self.name
            )));
        }

        for (name, spec) in &self.fields {
            match object.get(name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(schema_err(format!("missing required field '{name}'")));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(schema_err(format!(
                        "field '{name}' expects {:?}, got {value}",
                        spec.kind
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Resolve the parent key a write must carry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Schema` if a child write has no parent key, or a
    /// write to a root collection names one.
    pub fn parent_key_for(&self, write: &DocumentWrite) -> Result<Option<String>> {
        match &self.parent {
            None if write.parent_key.is_some() => Err(Error::Schema {
                key: write.key.clone(),
                reason: format!("'{}' has no parent collection", self.name),
            }),
            None => Ok(None),
            Some(parent) => write
                .parent_key
                .clone()
                .or_else(|| {
                    self.routing_field
                        .as_ref()
                        .and_then(|f| write.body.get(f))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .filter(|k| !k.is_empty())
                .map(Some)
                .ok_or_else(|| Error::Schema {
                    key: write.key.clone(),
                    reason: format!("child of '{parent}' requires a parent key"),
                }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Merge,
}

/// One pending write.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: String,
    pub key: String,
    pub body: Value,
    pub parent_key: Option<String>,
    pub mode: WriteMode,
}

impl DocumentWrite {
    #[must_use]
    pub fn replace(collection: &str, key: &str, body: Value) -> Self {
        Self {
            collection: collection.to_string(),
            key: key.to_string(),
            body,
            parent_key: None,
            mode: WriteMode::Replace,
        }
    }

    #[must_use]
    pub fn merge(collection: &str, key: &str, body: Value) -> Self {
        Self {
            mode: WriteMode::Merge,
            ..Self::replace(collection, key, body)
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_key: &str) -> Self {
        self.parent_key = Some(parent_key.to_string());
        self
    }
}

/// A write skipped during a bulk upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub collection: String,
    pub key: String,
    pub reason: String,
}

/// Outcome of a bulk upsert that reached the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub committed: usize,
    pub rejected: Vec<Rejection>,
}

/// Collection-oriented document storage.
pub trait DocumentStore: Send + Sync {
    /// Declare (or redeclare) a collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the parent collection is undeclared.
    fn define(&self, schema: CollectionSchema) -> Result<()>;

    /// Write one document; visible to reads once this returns.
    ///
    /// # Errors
    ///
    /// `Error::Schema` if the document does not conform, or a backend error.
    fn upsert(&self, write: DocumentWrite) -> Result<()>;

    /// Write many documents as one round trip.
    ///
    /// # Errors
    ///
    /// A backend error means nothing in the batch is guaranteed visible.
    fn bulk_upsert(&self, writes: Vec<DocumentWrite>) -> Result<BulkReport>;

    /// Fetch one document body.
    ///
    /// # Errors
    ///
    /// `Error::Query` if the read fails.
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Documents of `collection` matching `filter`, ordered by key.
    ///
    /// # Errors
    ///
    /// `Error::Query` for a malformed filter or a failed read.
    fn query(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Value>>;

    /// Number of documents in `collection`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the count fails.
    fn count(&self, collection: &str) -> Result<u64>;

    /// Remove every document of `collection`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete fails.
    fn clear(&self, collection: &str) -> Result<u64>;

    /// Read a named scalar of sync state.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    fn load_state(&self, name: &str) -> Result<Option<i64>>;

    /// Raise a named scalar of sync state to `candidate`, never lowering it.
    ///
    /// The comparison happens in the store, so concurrent writers from
    /// separate processes cannot move the value backwards. Returns the value
    /// now stored.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    fn advance_state(&self, name: &str, candidate: i64) -> Result<i64>;

    /// Take or renew the named lease for `owner` until `now + ttl_ms`.
    ///
    /// Succeeds when the lease is free, already held by `owner`, or expired.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the lease cannot be read or written.
    fn acquire_lease(&self, name: &str, owner: &str, now: i64, ttl_ms: i64) -> Result<bool>;

    /// Drop the named lease if `owner` still holds it.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete fails.
    fn release_lease(&self, name: &str, owner: &str) -> Result<()>;

    /// Owner of the named lease, if one is held and unexpired at `now`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    fn lease_holder(&self, name: &str, now: i64) -> Result<Option<String>>;
}

/// SQLite-backed [`DocumentStore`].
#[derive(Debug)]
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    schemas: RwLock<HashMap<String, CollectionSchema>>,
}

impl SqliteDocumentStore {
    /// Open a document store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a document store with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_index_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory document store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_index_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a write and resolve its parent key.
    fn prepare(&self, write: &DocumentWrite) -> Result<Option<String>> {
        let schemas = self.schemas.read();
        let schema = schemas.get(&write.collection).ok_or_else(|| Error::Schema {
            key: write.key.clone(),
            reason: format!("unknown collection '{}'", write.collection),
        })?;
        schema.validate(&write.key, &write.body)?;
        schema.parent_key_for(write)
    }
}

fn execute_write(
    conn: &Connection,
    write: &DocumentWrite,
    parent_key: Option<&str>,
    now: i64,
) -> Result<()> {
    let sql = match write.mode {
        WriteMode::Replace => {
            "INSERT INTO documents (collection, key, parent_key, body, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, key) DO UPDATE SET
               parent_key = excluded.parent_key,
               body = excluded.body,
               indexed_at = excluded.indexed_at"
        }
        WriteMode::Merge => {
            "INSERT INTO documents (collection, key, parent_key, body, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, key) DO UPDATE SET
               parent_key = COALESCE(excluded.parent_key, documents.parent_key),
               body = json_patch(documents.body, excluded.body),
               indexed_at = excluded.indexed_at"
        }
    };
    conn.execute(
        sql,
        rusqlite::params![
            write.collection,
            write.key,
            parent_key,
            serde_json::to_string(&write.body)?,
            now
        ],
    )?;
    Ok(())
}

fn decode_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| Error::Query(format!("stored document is corrupt: {e}")))
}

impl DocumentStore for SqliteDocumentStore {
    fn define(&self, schema: CollectionSchema) -> Result<()> {
        let mut schemas = self.schemas.write();
        if let Some(parent) = &schema.parent {
            if parent != &schema.name && !schemas.contains_key(parent) {
                return Err(Error::Config(format!(
                    "collection '{}' declares undefined parent '{parent}'",
                    schema.name
                )));
            }
        }
        debug!(collection = %schema.name, fields = schema.fields.len(), "Defined collection");
        schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    fn upsert(&self, write: DocumentWrite) -> Result<()> {
        let parent_key = self.prepare(&write)?;
        let now = chrono::Utc::now().timestamp_millis();
        execute_write(&self.conn.lock(), &write, parent_key.as_deref(), now)
    }

    fn bulk_upsert(&self, writes: Vec<DocumentWrite>) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        let mut accepted = Vec::with_capacity(writes.len());

        for write in writes {
            match self.prepare(&write) {
                Ok(parent_key) => accepted.push((write, parent_key)),
                Err(Error::Schema { key, reason }) => report.rejected.push(Rejection {
                    collection: write.collection.clone(),
                    key,
                    reason,
                }),
                Err(e) => return Err(e),
            }
        }

        if accepted.is_empty() {
            return Ok(report);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        for (write, parent_key) in &accepted {
            execute_write(&tx, write, parent_key.as_deref(), now)?;
        }
        tx.commit()?;

        report.committed = accepted.len();
        Ok(report)
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                [collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Query(e.to_string()))?;
        raw.as_deref().map(decode_body).transpose()
    }

    fn query(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Value>> {
        let compiled = {
            let schemas = self.schemas.read();
            let schema = schemas
                .get(collection)
                .ok_or_else(|| Error::Query(format!("unknown collection '{collection}'")))?;
            compile(filter, schema, "d0", &schemas)?
        };

        let sql = format!(
            "SELECT d0.body FROM documents d0
             WHERE d0.collection = ? AND ({})
             ORDER BY d0.key ASC
             LIMIT ?",
            compiled.sql
        );

        let mut params = Vec::with_capacity(compiled.params.len() + 2);
        params.push(rusqlite::types::Value::Text(collection.to_string()));
        params.extend(compiled.params);
        params.push(rusqlite::types::Value::Integer(
            i64::try_from(limit).unwrap_or(i64::MAX),
        ));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::Query(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, String>(0))
            .map_err(|e| Error::Query(e.to_string()))?;

        let mut documents = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|e| Error::Query(e.to_string()))?;
            documents.push(decode_body(&raw)?);
        }
        Ok(documents)
    }

    fn count(&self, collection: &str) -> Result<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn clear(&self, collection: &str) -> Result<u64> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM documents WHERE collection = ?1", [collection])?;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    fn load_state(&self, name: &str) -> Result<Option<i64>> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM sync_state WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn advance_state(&self, name: &str, candidate: i64) -> Result<i64> {
        let stored = self.conn.lock().query_row(
            "INSERT INTO sync_state (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 value = MAX(sync_state.value, excluded.value),
                 updated_at = excluded.updated_at
             RETURNING value",
            rusqlite::params![name, candidate, chrono::Utc::now().timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(stored)
    }

    fn acquire_lease(&self, name: &str, owner: &str, now: i64, ttl_ms: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let holder: Option<(String, i64)> = tx
            .query_row(
                "SELECT owner, expires_at FROM sync_lease WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let free = match &holder {
            None => true,
            Some((held_by, expires_at)) => held_by == owner || *expires_at <= now,
        };
        if free {
            tx.execute(
                "INSERT INTO sync_lease (name, owner, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at",
                rusqlite::params![name, owner, now.saturating_add(ttl_ms)],
            )?;
        }
        tx.commit()?;
        Ok(free)
    }

    fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM sync_lease WHERE name = ?1 AND owner = ?2",
            [name, owner],
        )?;
        Ok(())
    }

    fn lease_holder(&self, name: &str, now: i64) -> Result<Option<String>> {
        let owner = self
            .conn
            .lock()
            .query_row(
                "SELECT owner FROM sync_lease WHERE name = ?1 AND expires_at > ?2",
                rusqlite::params![name, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteDocumentStore {
        let store = SqliteDocumentStore::open_memory().unwrap();
        store
            .define(CollectionSchema::new("project").required("key", FieldKind::Keyword))
            .unwrap();
        store
            .define(
                CollectionSchema::new("grant")
                    .required("project", FieldKind::Keyword)
                    .field("group", FieldKind::Keyword)
                    .field("user", FieldKind::Keyword)
                    .child_of("project", Some("project")),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_replace_then_get() {
        let store = store();
        store
            .upsert(DocumentWrite::replace("project", "P1", json!({"key": "P1"})))
            .unwrap();
        assert_eq!(store.get("project", "P1").unwrap(), Some(json!({"key": "P1"})));
        assert_eq!(store.get("project", "P2").unwrap(), None);
        assert_eq!(store.count("project").unwrap(), 1);
    }

    #[test]
    fn test_merge_patches_existing_body() {
        let store = store();
        store
            .define(
                CollectionSchema::new("tagged")
                    .required("key", FieldKind::Keyword)
                    .field("label", FieldKind::Text),
            )
            .unwrap();
        store
            .upsert(DocumentWrite::replace("tagged", "T", json!({"key": "T", "label": "x"})))
            .unwrap();
        store
            .upsert(DocumentWrite::merge("tagged", "T", json!({"key": "T"})))
            .unwrap();
        assert_eq!(
            store.get("tagged", "T").unwrap(),
            Some(json!({"key": "T", "label": "x"}))
        );
    }

    #[test]
    fn test_child_requires_parent_key() {
        let store = store();
        let err = store.upsert(DocumentWrite::replace("grant", "g1", json!({"project": ""})));
        assert!(matches!(err, Err(Error::Schema { .. })));

        // Routed from the body
        store
            .upsert(DocumentWrite::replace("grant", "g1", json!({"project": "P1", "group": "user"})))
            .unwrap();

        // Root collections refuse a parent
        let err = store.upsert(
            DocumentWrite::replace("project", "P1", json!({"key": "P1"})).with_parent("X"),
        );
        assert!(matches!(err, Err(Error::Schema { .. })));
    }

    #[test]
    fn test_bulk_skips_invalid_and_commits_rest() {
        let store = store();
        let report = store
            .bulk_upsert(vec![
                DocumentWrite::replace("project", "P1", json!({"key": "P1"})),
                DocumentWrite::replace("project", "P2", json!({"key": 7})),
                DocumentWrite::replace("project", "P3", json!({"key": "P3", "extra": 1})),
                DocumentWrite::replace("project", "P4", json!({"key": "P4"})),
            ])
            .unwrap();

        assert_eq!(report.committed, 2);
        let rejected: Vec<&str> = report.rejected.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(rejected, vec!["P2", "P3"]);
        assert_eq!(store.count("project").unwrap(), 2);
    }

    #[test]
    fn test_has_child_join() {
        let store = store();
        for key in ["P1", "P2"] {
            store
                .upsert(DocumentWrite::merge("project", key, json!({"key": key})))
                .unwrap();
        }
        store
            .upsert(DocumentWrite::replace("grant", "g1", json!({"project": "P1", "group": "user"})))
            .unwrap();
        store
            .upsert(DocumentWrite::replace("grant", "g2", json!({"project": "P2", "user": "simon"})))
            .unwrap();

        let hits = store
            .query(
                "project",
                &Filter::has_child("grant", Filter::term("group", "user")),
                100,
            )
            .unwrap();
        assert_eq!(hits, vec![json!({"key": "P1"})]);

        let none = store
            .query(
                "project",
                &Filter::has_child("grant", Filter::term("group", "nobody")),
                100,
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_query_respects_limit() {
        let store = store();
        for i in 0..5 {
            let key = format!("P{i}");
            store
                .upsert(DocumentWrite::replace("project", &key, json!({"key": key})))
                .unwrap();
        }
        assert_eq!(store.query("project", &Filter::MatchAll, 3).unwrap().len(), 3);
        assert!(matches!(
            store.query("missing", &Filter::MatchAll, 3),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn test_clear_and_state() {
        let store = store();
        store
            .upsert(DocumentWrite::replace("project", "P1", json!({"key": "P1"})))
            .unwrap();
        assert_eq!(store.clear("project").unwrap(), 1);
        assert_eq!(store.count("project").unwrap(), 0);

        assert_eq!(store.load_state("watermark").unwrap(), None);
        assert_eq!(store.advance_state("watermark", 42).unwrap(), 42);
        assert_eq!(store.advance_state("watermark", 43).unwrap(), 43);
        assert_eq!(store.load_state("watermark").unwrap(), Some(43));
    }

    #[test]
    fn test_state_never_lowers_across_connections() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("index.db");
        let first = SqliteDocumentStore::open(&path).unwrap();
        let second = SqliteDocumentStore::open(&path).unwrap();

        assert_eq!(first.advance_state("watermark", 5_000).unwrap(), 5_000);
        // A stale writer on another connection keeps the higher value
        assert_eq!(second.advance_state("watermark", 3_000).unwrap(), 5_000);
        assert_eq!(first.load_state("watermark").unwrap(), Some(5_000));
        assert_eq!(second.advance_state("watermark", 7_000).unwrap(), 7_000);
        assert_eq!(first.load_state("watermark").unwrap(), Some(7_000));
    }

    #[test]
    fn test_lease_is_exclusive_until_released_or_expired() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("index.db");
        let first = SqliteDocumentStore::open(&path).unwrap();
        let second = SqliteDocumentStore::open(&path).unwrap();

        assert!(first.acquire_lease("sync", "a", 1_000, 500).unwrap());
        assert!(!second.acquire_lease("sync", "b", 1_200, 500).unwrap());
        assert_eq!(second.lease_holder("sync", 1_200).unwrap().as_deref(), Some("a"));

        // Renewal by the holder extends the lease
        assert!(first.acquire_lease("sync", "a", 1_400, 500).unwrap());
        assert!(!second.acquire_lease("sync", "b", 1_600, 500).unwrap());

        // Releasing under another owner does nothing
        second.release_lease("sync", "b").unwrap();
        assert!(!second.acquire_lease("sync", "b", 1_600, 500).unwrap());

        first.release_lease("sync", "a").unwrap();
        assert_eq!(second.lease_holder("sync", 1_600).unwrap(), None);
        assert!(second.acquire_lease("sync", "b", 1_600, 500).unwrap());

        // Expired leases are taken over
        assert_eq!(first.lease_holder("sync", 2_100).unwrap(), None);
        assert!(first.acquire_lease("sync", "a", 2_100, 500).unwrap());
    }

    #[test]
    fn test_define_requires_parent() {
        let store = SqliteDocumentStore::open_memory().unwrap();
        let err = store.define(CollectionSchema::new("orphan").child_of("nowhere", None));
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
