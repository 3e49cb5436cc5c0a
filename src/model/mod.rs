//! Data models for Issuedex.
//!
//! This module contains all domain models:
//! - IssueRecord (canonical, owned by the record store)
//! - IssueDocument (derived projection, owned by the issue index)
//! - ProjectDocument and PermissionGrant (authorization documents)

pub mod document;
pub mod issue;

pub use document::{IssueDocument, PermissionGrant, ProjectDocument, READ_PERMISSION};
pub use issue::{IssueRecord, IssueRow, RecordCursor, ResolvedKeys};
