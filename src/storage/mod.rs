//! SQLite storage layer.
//!
//! Two stores live here:
//! - the canonical record store (rules, components, issues)
//! - the document store backing the search projection
//!
//! # Submodules
//!
//! - [`documents`] - Collection-oriented document store with parent/child joins
//! - [`filter`] - Filter expressions and their SQL compilation
//! - [`records`] - Canonical record store
//! - [`schema`] - Database schema definitions

pub mod documents;
pub mod filter;
pub mod records;
pub mod schema;

pub use documents::{
    BulkReport, CollectionSchema, DocumentStore, DocumentWrite, FieldKind, FieldSpec, Rejection,
    SqliteDocumentStore, WriteMode,
};
pub use filter::{Filter, TermValue};
pub use records::{RecordStore, SqliteRecordStore};
