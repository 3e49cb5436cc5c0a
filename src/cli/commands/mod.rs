//! Command implementations.

pub mod completions;
pub mod grant;
pub mod init;
pub mod issue;
pub mod project;
pub mod reindex;
pub mod search;
pub mod sync;
pub mod version;

use crate::config::{resolve_paths, DbPaths, Settings};
use crate::error::{Error, Result};
use crate::index::{IssueIndex, PermissionIndex};
use crate::storage::{SqliteDocumentStore, SqliteRecordStore};
use crate::sync::SyncCoordinator;
use std::path::Path;
use std::sync::Arc;

/// Opened stores plus settings, shared by every command that touches data.
pub struct Workspace {
    pub settings: Settings,
    pub records: Arc<SqliteRecordStore>,
    pub documents: Arc<SqliteDocumentStore>,
}

impl Workspace {
    /// Open both stores; they must have been created by `init`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` if either database is missing.
    pub fn open(records_db: Option<&Path>, index_db: Option<&Path>) -> Result<Self> {
        let settings = Settings::load()?;
        let DbPaths { records, index } = resolve_paths(records_db, index_db)?;

        if !records.exists() || !index.exists() {
            return Err(Error::NotInitialized);
        }

        let timeout = Some(settings.busy_timeout_ms);
        Ok(Self {
            records: Arc::new(SqliteRecordStore::open_with_timeout(&records, timeout)?),
            documents: Arc::new(SqliteDocumentStore::open_with_timeout(&index, timeout)?),
            settings,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the collections cannot be declared.
    pub fn issues(&self) -> Result<IssueIndex> {
        IssueIndex::new(self.documents.clone())
    }

    /// # Errors
    ///
    /// Returns an error if the collections cannot be declared.
    pub fn permissions(&self) -> Result<PermissionIndex> {
        PermissionIndex::new(self.documents.clone())
    }

    /// # Errors
    ///
    /// Returns an error if the watermark cannot be loaded.
    pub fn coordinator(&self) -> Result<SyncCoordinator> {
        SyncCoordinator::new(self.records.clone(), self.documents.clone(), &self.settings)
    }
}
