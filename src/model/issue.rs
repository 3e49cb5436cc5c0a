//! Canonical issue records as stored in the relational record store.
//!
//! Records reference rules and components by numeric id; the record store
//! resolves those ids to key strings when it reads a row, so the rest of
//! the crate only ever sees an [`IssueRow`] (record + resolved keys).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An issue as owned by the record store.
///
/// Timestamps are Unix milliseconds. `updated_at` always advances when the
/// record is mutated; incremental sync relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Unique issue key.
    pub key: String,
    /// Rule that raised the issue.
    pub rule_id: Option<i64>,
    /// Component (file, module) the issue sits on.
    pub component_id: Option<i64>,
    /// Root component, i.e. the project.
    pub root_component_id: Option<i64>,
    pub status: Option<String>,
    pub resolution: Option<String>,
    pub severity: Option<String>,
    pub assignee: Option<String>,
    pub author_login: Option<String>,
    pub reporter: Option<String>,
    pub message: Option<String>,
    pub line: Option<i64>,
    pub effort_to_fix: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    pub action_plan_key: Option<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl IssueRecord {
    /// Create a record with only the key and timestamps set.
    #[must_use]
    pub fn new(key: impl Into<String>, now: i64) -> Self {
        Self {
            key: key.into(),
            rule_id: None,
            component_id: None,
            root_component_id: None,
            status: None,
            resolution: None,
            severity: None,
            assignee: None,
            author_login: None,
            reporter: None,
            message: None,
            line: None,
            effort_to_fix: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            action_plan_key: None,
            attributes: BTreeMap::new(),
        }
    }
}

/// Key strings resolved from the ids an [`IssueRecord`] references.
///
/// A dangling reference resolves to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedKeys {
    /// Rendered as `repository:rule`.
    pub rule_key: Option<String>,
    pub component_key: Option<String>,
    pub root_component_key: Option<String>,
}

/// A record together with its resolved keys, as returned by the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRow {
    pub record: IssueRecord,
    pub keys: ResolvedKeys,
}

impl IssueRow {
    /// Position of this row in `(updated_at, key)` order.
    #[must_use]
    pub fn cursor(&self) -> RecordCursor {
        RecordCursor {
            updated_at: self.record.updated_at,
            key: self.record.key.clone(),
        }
    }
}

/// Resume point for paging through records in `(updated_at, key)` order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordCursor {
    pub updated_at: i64,
    pub key: String,
}

/// Encode attributes as `key=value` lines.
#[must_use]
pub fn encode_attributes(attributes: &BTreeMap<String, String>) -> Option<String> {
    if attributes.is_empty() {
        return None;
    }
    let lines: Vec<String> = attributes
        .iter()
        .map(|(k, v)| format!("{k}={}", v.replace('\n', " ")))
        .collect();
    Some(lines.join("\n"))
}

/// Decode `key=value` lines. Lines without `=` are ignored.
#[must_use]
pub fn decode_attributes(raw: Option<&str>) -> BTreeMap<String, String> {
    raw.map(|text| {
        text.lines()
            .filter_map(|line| line.split_once('='))
            .filter(|(k, _)| !k.trim().is_empty())
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
            .collect()
    })
    .unwrap_or_default()
}
