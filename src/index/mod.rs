//! Search projection over the document store.
//!
//! Three collections make up the projection: issues, projects, and
//! permission grants. Issues and grants are both children of their project;
//! authorization joins an issue to the grants of its project through that
//! shared parent.
//!
//! # Submodules
//!
//! - [`authorization`] - Builds the per-identity visibility filter
//! - [`collections`] - Collection definitions
//! - [`issue`] - Issue documents
//! - [`mapper`] - Record to document mapping
//! - [`permission`] - Project and grant documents, with bulk writes

pub mod authorization;
pub mod collections;
pub mod issue;
pub mod mapper;
pub mod permission;

pub use authorization::AuthorizationFilterBuilder;
pub use collections::{ISSUES, PERMISSIONS, PROJECTS};
pub use issue::IssueIndex;
pub use mapper::to_document;
pub use permission::{PermissionBulk, PermissionIndex};
pub use crate::storage::{Filter, TermValue};
