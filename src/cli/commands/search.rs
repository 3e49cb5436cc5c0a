//! Search command: query the issue index as a given identity.

use crate::cli::commands::Workspace;
use crate::cli::SearchArgs;
use crate::error::Result;
use crate::index::{AuthorizationFilterBuilder, Filter};
use crate::model::IssueDocument;
use crate::validate::{normalize_severity, normalize_status};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct SearchOutput<'a> {
    issues: &'a [IssueDocument],
    count: usize,
}

/// Execute the search command.
///
/// Only issues of projects the identity holds a read grant on are returned.
///
/// # Errors
///
/// Returns `Error::Query` if the index cannot be read.
pub fn execute(
    args: &SearchArgs,
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    let base = base_filter(args);
    let auth = authorization(args).build();
    let issues = ws.issues()?.query(&base, &auth, args.limit)?;

    if json {
        let output = SearchOutput {
            issues: &issues,
            count: issues.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    println!("Issues ({} found):", issues.len());
    println!();
    for doc in &issues {
        let status = doc.status.as_deref().unwrap_or("-");
        let severity = doc.severity.as_deref().unwrap_or("-");
        let status = match status {
            "OPEN" | "REOPENED" => status.yellow(),
            "CLOSED" | "RESOLVED" => status.green(),
            _ => status.normal(),
        };
        println!(
            "{:<10} {:<9} {:<9} {}",
            doc.key.bold(),
            status,
            severity,
            doc.message.as_deref().unwrap_or("")
        );
        if let Some(project) = &doc.root_component_key {
            println!("           {}", project.dimmed());
        }
    }
    Ok(())
}

fn authorization(args: &SearchArgs) -> AuthorizationFilterBuilder {
    let builder = match args.user.as_deref() {
        Some(user) => AuthorizationFilterBuilder::new(user),
        None => AuthorizationFilterBuilder::anonymous(),
    };
    builder.groups(args.groups.iter().map(String::as_str))
}

/// Field filters from the command line; unrecognized status or severity
/// values are matched verbatim.
fn base_filter(args: &SearchArgs) -> Filter {
    let mut filter = Filter::MatchAll;
    if let Some(status) = &args.status {
        let status = normalize_status(status).unwrap_or_else(|(raw, _)| raw);
        filter = filter.and(Filter::term("status", status));
    }
    if let Some(severity) = &args.severity {
        let severity = normalize_severity(severity).unwrap_or_else(|(raw, _)| raw);
        filter = filter.and(Filter::term("severity", severity));
    }
    if let Some(project) = &args.project {
        filter = filter.and(Filter::term("rootComponentKey", project.as_str()));
    }
    if let Some(assignee) = &args.assignee {
        filter = filter.and(Filter::term("assignee", assignee.as_str()));
    }
    filter
}
