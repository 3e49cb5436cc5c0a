//! Record to document mapping.

use crate::model::{IssueDocument, IssueRecord, ResolvedKeys};

/// Project a canonical record onto its search document.
///
/// Field-for-field copy with ids replaced by their resolved key strings.
#[must_use]
pub fn to_document(record: &IssueRecord, keys: &ResolvedKeys) -> IssueDocument {
    IssueDocument {
        key: record.key.clone(),
        rule_key: keys.rule_key.clone(),
        component_key: keys.component_key.clone(),
        root_component_key: keys.root_component_key.clone(),
        status: record.status.clone(),
        resolution: record.resolution.clone(),
        severity: record.severity.clone(),
        assignee: record.assignee.clone(),
        author_login: record.author_login.clone(),
        reporter: record.reporter.clone(),
        message: record.message.clone(),
        line: record.line,
        effort_to_fix: record.effort_to_fix,
        creation_date: record.created_at,
        update_date: record.updated_at,
        close_date: record.closed_at,
        action_plan_key: record.action_plan_key.clone(),
        attributes: record.attributes.clone(),
    }
}
