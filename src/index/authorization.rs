//! Query-time authorization filter.
//!
//! An issue is visible when its project has at least one grant of the
//! required permission naming the acting user or one of their groups.
//! No identity means no visibility; there is no superuser bypass. A group
//! such as `anyone` only applies if the caller lists it.

use crate::index::collections::{PERMISSIONS, PROJECTS};
use crate::model::READ_PERMISSION;
use crate::storage::Filter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationFilterBuilder {
    user: Option<String>,
    groups: Vec<String>,
    permission: String,
}

impl AuthorizationFilterBuilder {
    /// Start from the acting user; an empty string means anonymous.
    #[must_use]
    pub fn new(user: &str) -> Self {
        Self {
            user: (!user.is_empty()).then(|| user.to_string()),
            groups: Vec::new(),
            permission: READ_PERMISSION.to_string(),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("")
    }

    #[must_use]
    pub fn group(mut self, group: &str) -> Self {
        if !group.is_empty() && !self.groups.iter().any(|g| g == group) {
            self.groups.push(group.to_string());
        }
        self
    }

    #[must_use]
    pub fn groups<I, S>(self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        groups
            .into_iter()
            .fold(self, |builder, g| builder.group(g.as_ref()))
    }

    /// Permission kind the grant must carry (default `read`).
    #[must_use]
    pub fn permission(mut self, permission: &str) -> Self {
        self.permission = permission.to_string();
        self
    }

    /// Predicate over a single grant document.
    #[must_use]
    pub fn grant_predicate(&self) -> Filter {
        let mut grantees = Vec::new();
        if let Some(user) = &self.user {
            grantees.push(Filter::term("user", user.as_str()));
        }
        if !self.groups.is_empty() {
            grantees.push(Filter::terms("group", self.groups.iter().map(String::as_str)));
        }

        if grantees.is_empty() {
            return Filter::MatchNone;
        }
        Filter::term("permission", self.permission.as_str()).and(Filter::Or(grantees))
    }

    /// Filter over issue documents, to be intersected with the caller's query.
    #[must_use]
    pub fn build(&self) -> Filter {
        match self.grant_predicate() {
            Filter::MatchNone => Filter::MatchNone,
            predicate => Filter::has_parent(PROJECTS, Filter::has_child(PERMISSIONS, predicate)),
        }
    }
}
