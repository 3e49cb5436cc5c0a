//! Project and permission-grant documents.
//!
//! Grants are children of their project and insert-only: each grant gets a
//! fresh key, so repeated grants accumulate. Nothing here reads grants back;
//! they are consumed through the authorization filter at query time.

use crate::error::{Error, Result};
use crate::index::collections::{define_all, PERMISSIONS, PROJECTS};
use crate::model::{PermissionGrant, ProjectDocument};
use crate::storage::{BulkReport, DocumentStore, DocumentWrite};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Write-only store of projects and their grants.
#[derive(Clone)]
pub struct PermissionIndex {
    store: Arc<dyn DocumentStore>,
}

impl PermissionIndex {
    /// Wrap a document store, declaring the projection's collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the collections cannot be declared.
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self> {
        define_all(store.as_ref())?;
        Ok(Self { store })
    }

    /// Create or merge a project document.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for an empty key, or a backend error.
    pub fn upsert_project(&self, key: &str) -> Result<()> {
        self.store.upsert(project_write(key)?)
    }

    /// Append a `read` grant for one user or one group on `project`.
    ///
    /// Empty strings count as absent. Returns the generated grant key.
    ///
    /// # Errors
    ///
    /// `Error::Validation` unless exactly one of `user`/`group` is given.
    pub fn add_grant(
        &self,
        project: &str,
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<String> {
        self.add(&PermissionGrant::read(project, user, group)?)
    }

    /// Append an already-validated grant, re-indexing its project.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    pub fn add(&self, grant: &PermissionGrant) -> Result<String> {
        let (key, writes) = grant_writes(grant)?;
        let report = self.store.bulk_upsert(writes)?;
        if let Some(rejection) = report.rejected.into_iter().next() {
            return Err(Error::Schema {
                key: rejection.key,
                reason: rejection.reason,
            });
        }
        debug!(project = %grant.project, grant = %key, "Added grant");
        Ok(key)
    }

    /// Start a bulk writer flushing every `threshold` buffered writes.
    #[must_use]
    pub fn bulk(&self, threshold: usize) -> PermissionBulk<'_> {
        PermissionBulk {
            index: self,
            threshold: threshold.max(1),
            pending: Vec::new(),
        }
    }
}

/// Buffered project/grant writes, flushed as one round trip.
///
/// A flush is the commit boundary. If it fails, nothing in the batch is
/// guaranteed visible and the batch stays buffered for the next `flush`.
pub struct PermissionBulk<'a> {
    index: &'a PermissionIndex,
    threshold: usize,
    pending: Vec<DocumentWrite>,
}

impl PermissionBulk<'_> {
    /// Buffer a project create-or-merge.
    ///
    /// # Errors
    ///
    /// `Error::Validation` for an empty key, or the error of a triggered flush.
    pub fn upsert_project(&mut self, key: &str) -> Result<()> {
        self.pending.push(project_write(key)?);
        self.flush_if_full()
    }

    /// Buffer a `read` grant.
    ///
    /// # Errors
    ///
    /// `Error::Validation` immediately for a malformed grant, or the error
    /// of a triggered flush.
    pub fn add_grant(
        &mut self,
        project: &str,
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<String> {
        let grant = PermissionGrant::read(project, user, group)?;
        let (key, writes) = grant_writes(&grant)?;
        self.pending.extend(writes);
        self.flush_if_full()?;
        Ok(key)
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Send every buffered write.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the batch is kept for retry.
    pub fn flush(&mut self) -> Result<BulkReport> {
        if self.pending.is_empty() {
            return Ok(BulkReport::default());
        }

        let report = self.index.store.bulk_upsert(self.pending.clone())?;
        self.pending.clear();

        for rejection in &report.rejected {
            warn!(key = %rejection.key, reason = %rejection.reason, "Permission write rejected");
        }
        debug!(committed = report.committed, "Flushed permission batch");
        Ok(report)
    }

    fn flush_if_full(&mut self) -> Result<()> {
        if self.pending.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for PermissionBulk<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "Permission batch dropped without flush"
            );
        }
    }
}

fn project_write(key: &str) -> Result<DocumentWrite> {
    if key.is_empty() {
        return Err(Error::Validation("project key must not be empty".to_string()));
    }
    let body = serde_json::to_value(ProjectDocument {
        key: key.to_string(),
    })?;
    Ok(DocumentWrite::merge(PROJECTS, key, body))
}

/// The grant write preceded by its project's create-or-merge.
fn grant_writes(grant: &PermissionGrant) -> Result<(String, Vec<DocumentWrite>)> {
    let key = Uuid::new_v4().to_string();
    let grant_write = DocumentWrite::replace(PERMISSIONS, &key, serde_json::to_value(grant)?)
        .with_parent(&grant.project);
    Ok((key, vec![project_write(&grant.project)?, grant_write]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BulkReport, CollectionSchema, Filter, SqliteDocumentStore};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Document store whose bulk writes fail while `down` is set.
    struct Flaky {
        inner: SqliteDocumentStore,
        down: AtomicBool,
    }

    impl DocumentStore for Flaky {
        fn define(&self, schema: CollectionSchema) -> Result<()> {
            self.inner.define(schema)
        }
        fn upsert(&self, write: DocumentWrite) -> Result<()> {
            self.inner.upsert(write)
        }
        fn bulk_upsert(&self, writes: Vec<DocumentWrite>) -> Result<BulkReport> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::TransientBackend("index offline".to_string()));
            }
            self.inner.bulk_upsert(writes)
        }
        fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
            self.inner.get(collection, key)
        }
        fn query(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Value>> {
            self.inner.query(collection, filter, limit)
        }
        fn count(&self, collection: &str) -> Result<u64> {
            self.inner.count(collection)
        }
        fn clear(&self, collection: &str) -> Result<u64> {
            self.inner.clear(collection)
        }
        fn load_state(&self, name: &str) -> Result<Option<i64>> {
            self.inner.load_state(name)
        }
        fn advance_state(&self, name: &str, candidate: i64) -> Result<i64> {
            self.inner.advance_state(name, candidate)
        }
        fn acquire_lease(&self, name: &str, owner: &str, now: i64, ttl_ms: i64) -> Result<bool> {
            self.inner.acquire_lease(name, owner, now, ttl_ms)
        }
        fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
            self.inner.release_lease(name, owner)
        }
        fn lease_holder(&self, name: &str, now: i64) -> Result<Option<String>> {
            self.inner.lease_holder(name, now)
        }
    }

    fn flaky() -> Arc<Flaky> {
        Arc::new(Flaky {
            inner: SqliteDocumentStore::open_memory().unwrap(),
            down: AtomicBool::new(false),
        })
    }

    #[test]
    fn test_add_grant_validates_grantee() {
        let store = flaky();
        let index = PermissionIndex::new(store.clone()).unwrap();

        let both = index.add_grant("P1", Some("julien"), Some("user"));
        assert!(matches!(both, Err(Error::Validation(_))));
        let neither = index.add_grant("P1", None, None);
        assert!(matches!(neither, Err(Error::Validation(_))));
        assert_eq!(store.count(PERMISSIONS).unwrap(), 0);
    }

    #[test]
    fn test_grants_accumulate_and_create_project() {
        let store = flaky();
        let index = PermissionIndex::new(store.clone()).unwrap();

        let first = index.add_grant("P1", None, Some("user")).unwrap();
        let second = index.add_grant("P1", None, Some("user")).unwrap();
        assert_ne!(first, second);

        assert_eq!(store.count(PERMISSIONS).unwrap(), 2);
        assert_eq!(store.count(PROJECTS).unwrap(), 1);
        let grant = store.get(PERMISSIONS, &first).unwrap().unwrap();
        assert_eq!(grant["permission"], "read");
        assert_eq!(grant["project"], "P1");
    }

    #[test]
    fn test_upsert_project_is_idempotent() {
        let store = flaky();
        let index = PermissionIndex::new(store.clone()).unwrap();
        index.upsert_project("P1").unwrap();
        index.upsert_project("P1").unwrap();
        assert_eq!(store.count(PROJECTS).unwrap(), 1);
        assert!(matches!(index.upsert_project(""), Err(Error::Validation(_))));
    }

    #[test]
    fn test_bulk_flushes_at_threshold() {
        let store = flaky();
        let index = PermissionIndex::new(store.clone()).unwrap();
        let mut bulk = index.bulk(3);

        bulk.upsert_project("P1").unwrap();
        assert_eq!(bulk.pending(), 1);
        // Project merge + grant: reaches the threshold
        bulk.add_grant("P1", Some("simon"), None).unwrap();
        bulk.add_grant("P1", None, Some("user")).unwrap();
        assert_eq!(bulk.pending(), 2);
        assert_eq!(store.count(PERMISSIONS).unwrap(), 1);

        let report = bulk.flush().unwrap();
        assert_eq!(report.committed, 2);
        assert_eq!(bulk.pending(), 0);
        assert_eq!(store.count(PERMISSIONS).unwrap(), 2);
    }

    #[test]
    fn test_failed_flush_keeps_batch_for_retry() {
        let store = flaky();
        let index = PermissionIndex::new(store.clone()).unwrap();
        let mut bulk = index.bulk(100);

        bulk.add_grant("P1", None, Some("user")).unwrap();
        bulk.add_grant("P2", None, Some("reviewer")).unwrap();

        store.down.store(true, Ordering::SeqCst);
        let err = bulk.flush().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(bulk.pending(), 4);
        assert_eq!(store.count(PERMISSIONS).unwrap(), 0);

        store.down.store(false, Ordering::SeqCst);
        let report = bulk.flush().unwrap();
        assert_eq!(report.committed, 4);
        assert_eq!(store.count(PERMISSIONS).unwrap(), 2);
        assert_eq!(store.count(PROJECTS).unwrap(), 2);
    }

    #[test]
    fn test_bulk_rejects_bad_grant_immediately() {
        let store = flaky();
        let index = PermissionIndex::new(store).unwrap();
        let mut bulk = index.bulk(10);
        let err = bulk.add_grant("P1", Some("a"), Some("b"));
        assert!(matches!(err, Err(Error::Validation(_))));
        assert_eq!(bulk.pending(), 0);
    }
}
