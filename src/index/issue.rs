//! Issue documents in the search projection.

use crate::error::{Error, Result};
use crate::index::collections::{define_all, ISSUES};
use crate::model::IssueDocument;
use crate::storage::{BulkReport, DocumentStore, DocumentWrite, Filter};
use std::sync::Arc;
use tracing::debug;

/// Stores and queries [`IssueDocument`]s.
///
/// Writes replace the whole document; a document is never partially patched.
/// Backend failures surface to the caller as-is, no retry happens here.
#[derive(Clone)]
pub struct IssueIndex {
    store: Arc<dyn DocumentStore>,
}

impl IssueIndex {
    /// Wrap a document store, declaring the projection's collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the collections cannot be declared.
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self> {
        define_all(store.as_ref())?;
        Ok(Self { store })
    }

    /// Replace-by-key write of one document.
    ///
    /// # Errors
    ///
    /// `Error::Schema` if the document has no project key, or a backend error.
    pub fn upsert(&self, doc: &IssueDocument) -> Result<()> {
        self.store.upsert(to_write(doc)?)
    }

    /// Replace-by-key write of many documents in one round trip.
    ///
    /// Non-conforming documents are skipped and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns a backend error; nothing in the batch is then guaranteed visible.
    pub fn bulk_upsert(&self, docs: &[IssueDocument]) -> Result<BulkReport> {
        let writes = docs.iter().map(to_write).collect::<Result<Vec<_>>>()?;
        let report = self.store.bulk_upsert(writes)?;
        debug!(
            committed = report.committed,
            rejected = report.rejected.len(),
            "Bulk upserted issues"
        );
        Ok(report)
    }

    /// Fetch one document; `None` if absent.
    ///
    /// # Errors
    ///
    /// `Error::Query` if the read fails.
    pub fn get_by_key(&self, key: &str) -> Result<Option<IssueDocument>> {
        self.store
            .get(ISSUES, key)?
            .map(from_body)
            .transpose()
    }

    /// Number of issue documents.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the count fails.
    pub fn count_all(&self) -> Result<u64> {
        self.store.count(ISSUES)
    }

    /// Documents matching both `base` and `auth`, at most `max_results`.
    ///
    /// # Errors
    ///
    /// `Error::Query` for a malformed filter or a failed read. An error is
    /// never reported as an empty result.
    pub fn query(
        &self,
        base: &Filter,
        auth: &Filter,
        max_results: usize,
    ) -> Result<Vec<IssueDocument>> {
        let filter = base.clone().and(auth.clone());
        self.store
            .query(ISSUES, &filter, max_results)?
            .into_iter()
            .map(from_body)
            .collect()
    }

    /// Remove every issue document, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete fails.
    pub fn clear(&self) -> Result<u64> {
        self.store.clear(ISSUES)
    }
}

fn to_write(doc: &IssueDocument) -> Result<DocumentWrite> {
    Ok(DocumentWrite::replace(ISSUES, &doc.key, serde_json::to_value(doc)?))
}

fn from_body(body: serde_json::Value) -> Result<IssueDocument> {
    serde_json::from_value(body).map_err(|e| Error::Query(format!("malformed issue document: {e}")))
}
