//! Documents stored in the search projection.
//!
//! Field names are camelCase on the wire; they are the names filters refer to.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Permission kind granting visibility of a project's issues.
pub const READ_PERMISSION: &str = "read";

/// Denormalized projection of one issue record.
///
/// `key` always equals the source record key. Component and project keys
/// are plain strings; no id indirection survives into the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDocument {
    pub key: String,
    pub rule_key: Option<String>,
    pub component_key: Option<String>,
    pub root_component_key: Option<String>,
    pub status: Option<String>,
    pub resolution: Option<String>,
    pub severity: Option<String>,
    pub assignee: Option<String>,
    pub author_login: Option<String>,
    pub reporter: Option<String>,
    pub message: Option<String>,
    pub line: Option<i64>,
    pub effort_to_fix: Option<f64>,
    pub creation_date: i64,
    pub update_date: i64,
    pub close_date: Option<i64>,
    pub action_plan_key: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Root of a project's permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub key: String,
}

/// A grant of `permission` on `project` to one user or one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl PermissionGrant {
    /// Build a grant, enforcing that exactly one of `user`/`group` is set.
    ///
    /// Empty strings count as absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the project key is empty, or if both
    /// or neither of `user` and `group` are supplied.
    pub fn new(
        permission: &str,
        project: &str,
        user: Option<&str>,
        group: Option<&str>,
    ) -> Result<Self> {
        let user = user.filter(|u| !u.is_empty());
        let group = group.filter(|g| !g.is_empty());

        if project.is_empty() {
            return Err(Error::Validation("grant requires a project key".to_string()));
        }
        if permission.is_empty() {
            return Err(Error::Validation("grant requires a permission kind".to_string()));
        }

        match (user, group) {
            (Some(_), Some(_)) => Err(Error::Validation(
                "grant names both a user and a group; exactly one is allowed".to_string(),
            )),
            (None, None) => Err(Error::Validation(
                "grant names neither a user nor a group".to_string(),
            )),
            _ => Ok(Self {
                permission: permission.to_string(),
                project: project.to_string(),
                user: user.map(str::to_string),
                group: group.map(str::to_string),
            }),
        }
    }

    /// Build a `read` grant.
    ///
    /// # Errors
    ///
    /// See [`PermissionGrant::new`].
    pub fn read(project: &str, user: Option<&str>, group: Option<&str>) -> Result<Self> {
        Self::new(READ_PERMISSION, project, user, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_requires_exactly_one_grantee() {
        assert!(PermissionGrant::read("P1", Some("julien"), None).is_ok());
        assert!(PermissionGrant::read("P1", None, Some("user")).is_ok());

        let both = PermissionGrant::read("P1", Some("julien"), Some("user"));
        assert!(matches!(both, Err(Error::Validation(_))));

        let neither = PermissionGrant::read("P1", None, None);
        assert!(matches!(neither, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let grant = PermissionGrant::read("P1", Some(""), Some("anyone")).unwrap();
        assert_eq!(grant.user, None);
        assert_eq!(grant.group.as_deref(), Some("anyone"));

        assert!(PermissionGrant::read("P1", Some(""), Some("")).is_err());
        assert!(PermissionGrant::read("", None, Some("user")).is_err());
    }

    #[test]
    fn test_grant_serializes_only_the_set_grantee() {
        let grant = PermissionGrant::read("P1", None, Some("user")).unwrap();
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value["permission"], "read");
        assert_eq!(value["project"], "P1");
        assert_eq!(value["group"], "user");
        assert!(value.get("user").is_none());
    }

    #[test]
    fn test_issue_document_uses_camel_case() {
        let doc = IssueDocument {
            key: "ABC-1".to_string(),
            rule_key: Some("xoo:x1".to_string()),
            component_key: Some("MyComponent".to_string()),
            root_component_key: Some("MyProject".to_string()),
            status: Some("OPEN".to_string()),
            resolution: None,
            severity: Some("MAJOR".to_string()),
            assignee: None,
            author_login: None,
            reporter: None,
            message: None,
            line: Some(12),
            effort_to_fix: None,
            creation_date: 1,
            update_date: 2,
            close_date: None,
            action_plan_key: None,
            attributes: BTreeMap::new(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["rootComponentKey"], "MyProject");
        assert_eq!(value["updateDate"], 2);
    }
}
