//! Collection definitions for the search projection.

use crate::error::Result;
use crate::storage::{CollectionSchema, DocumentStore, FieldKind};

/// Issue documents, children of their project.
pub const ISSUES: &str = "issues";
/// Project documents, parents of issues and permission grants.
pub const PROJECTS: &str = "issue_project";
/// Permission grants, children of their project.
pub const PERMISSIONS: &str = "issue_permission";

#[must_use]
pub fn project_schema() -> CollectionSchema {
    CollectionSchema::new(PROJECTS).required("key", FieldKind::Keyword)
}

#[must_use]
pub fn permission_schema() -> CollectionSchema {
    CollectionSchema::new(PERMISSIONS)
        .required("permission", FieldKind::Keyword)
        .required("project", FieldKind::Keyword)
        .field("user", FieldKind::Keyword)
        .field("group", FieldKind::Keyword)
        .child_of(PROJECTS, Some("project"))
}

#[must_use]
pub fn issue_schema() -> CollectionSchema {
    CollectionSchema::new(ISSUES)
        .required("key", FieldKind::Keyword)
        .field("ruleKey", FieldKind::Keyword)
        .field("componentKey", FieldKind::Keyword)
        .required("rootComponentKey", FieldKind::Keyword)
        .field("status", FieldKind::Keyword)
        .field("resolution", FieldKind::Keyword)
        .field("severity", FieldKind::Keyword)
        .field("assignee", FieldKind::Keyword)
        .field("authorLogin", FieldKind::Keyword)
        .field("reporter", FieldKind::Keyword)
        .field("message", FieldKind::Text)
        .field("line", FieldKind::Integer)
        .field("effortToFix", FieldKind::Float)
        .required("creationDate", FieldKind::Date)
        .required("updateDate", FieldKind::Date)
        .field("closeDate", FieldKind::Date)
        .field("actionPlanKey", FieldKind::Keyword)
        .field("attributes", FieldKind::Object)
        .child_of(PROJECTS, Some("rootComponentKey"))
}

/// Declare every collection, parents first.
///
/// # Errors
///
/// Returns an error if the store rejects a definition.
pub fn define_all(store: &dyn DocumentStore) -> Result<()> {
    store.define(project_schema())?;
    store.define(permission_schema())?;
    store.define(issue_schema())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteDocumentStore;

    #[test]
    fn test_children_route_to_projects() {
        assert_eq!(issue_schema().parent.as_deref(), Some(PROJECTS));
        assert_eq!(issue_schema().routing_field.as_deref(), Some("rootComponentKey"));
        assert_eq!(permission_schema().routing_field.as_deref(), Some("project"));
        assert!(project_schema().parent.is_none());
    }

    #[test]
    fn test_define_all_is_repeatable() {
        let store = SqliteDocumentStore::open_memory().unwrap();
        define_all(&store).unwrap();
        define_all(&store).unwrap();
        assert_eq!(store.count(ISSUES).unwrap(), 0);
    }
}
