//! Issue command implementations.
//!
//! These write the canonical record store only. The index picks changes up
//! on the next sync run.

use crate::cli::commands::Workspace;
use crate::cli::{IssueAddArgs, IssueCommands};
use crate::error::{Error, Result};
use crate::model::{IssueDocument, IssueRecord, ResolvedKeys};
use crate::validate::{normalize_severity, normalize_status};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize)]
struct IssueAddOutput<'a> {
    key: &'a str,
    project: &'a str,
    status: &'a str,
    severity: &'a str,
}

#[derive(Serialize)]
struct IssueShowOutput<'a> {
    record: &'a IssueRecord,
    keys: &'a ResolvedKeys,
    document: Option<&'a IssueDocument>,
}

/// Execute issue commands.
///
/// # Errors
///
/// Returns an error if the stores cannot be opened or the command fails.
pub fn execute(
    command: &IssueCommands,
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    match command {
        IssueCommands::Add(args) => add(&ws, args, json),
        IssueCommands::Status {
            key,
            status,
            resolution,
        } => set_status(&ws, key, status, resolution.as_deref(), json),
        IssueCommands::Show { key } => show(&ws, key, json),
    }
}

fn add(ws: &Workspace, args: &IssueAddArgs, json: bool) -> Result<()> {
    let status = parse_status(&args.status)?;
    let severity = normalize_severity(&args.severity).map_err(|(input, suggestion)| {
        Error::InvalidArgument(format!("Invalid severity '{input}'{}", did_you_mean(suggestion)))
    })?;
    let (repository, rule) = args.rule.split_once(':').ok_or_else(|| {
        Error::InvalidArgument(format!("Rule '{}' must be repository:rule", args.rule))
    })?;
    let attributes: BTreeMap<String, String> = args
        .attributes
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| Error::InvalidArgument(format!("Attribute '{pair}' must be key=value")))
        })
        .collect::<Result<_>>()?;

    let project_id = ws.records.project_id(&args.project)?.ok_or_else(|| {
        Error::Validation(format!(
            "Unknown project '{}'. Run `issuedex project add {}` first.",
            args.project, args.project
        ))
    })?;
    let component_id = match &args.component {
        Some(component) => ws.records.insert_component(component, project_id)?,
        None => project_id,
    };

    let now = chrono::Utc::now().timestamp_millis();
    let mut record = IssueRecord::new(args.key.as_str(), now);
    record.rule_id = Some(ws.records.insert_rule(repository, rule)?);
    record.component_id = Some(component_id);
    record.root_component_id = Some(project_id);
    record.status = Some(status.clone());
    record.severity = Some(severity.clone());
    record.message.clone_from(&args.message);
    record.line = args.line.map(i64::from);
    record.assignee.clone_from(&args.assignee);
    record.author_login.clone_from(&args.author);
    record.reporter.clone_from(&args.reporter);
    record.effort_to_fix = args.effort;
    record.action_plan_key.clone_from(&args.action_plan);
    record.attributes = attributes;
    record.closed_at = (status == "CLOSED").then_some(now);
    ws.records.save_issue(&record)?;

    if json {
        let output = IssueAddOutput {
            key: &args.key,
            project: &args.project,
            status: &status,
            severity: &severity,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "Recorded {} in {} ({status}, {severity})",
            args.key.bold(),
            args.project
        );
    }
    Ok(())
}

fn set_status(
    ws: &Workspace,
    key: &str,
    status: &str,
    resolution: Option<&str>,
    json: bool,
) -> Result<()> {
    let status = parse_status(status)?;
    let now = chrono::Utc::now().timestamp_millis();
    ws.records.update_issue_status(key, &status, resolution, now)?;

    if json {
        println!("{}", serde_json::json!({ "key": key, "status": status }));
    } else {
        println!("{} is now {}", key.bold(), status);
    }
    Ok(())
}

fn show(ws: &Workspace, key: &str, json: bool) -> Result<()> {
    use crate::storage::RecordStore;

    let row = ws
        .records
        .get_by_key(key)?
        .ok_or_else(|| Error::IssueNotFound {
            key: key.to_string(),
        })?;
    let document = ws.issues()?.get_by_key(key)?;

    if json {
        let output = IssueShowOutput {
            record: &row.record,
            keys: &row.keys,
            document: document.as_ref(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let record = &row.record;
    println!("{}", record.key.bold());
    print_field("Status", record.status.as_deref());
    print_field("Resolution", record.resolution.as_deref());
    print_field("Severity", record.severity.as_deref());
    print_field("Project", row.keys.root_component_key.as_deref());
    print_field("Component", row.keys.component_key.as_deref());
    print_field("Rule", row.keys.rule_key.as_deref());
    print_field("Assignee", record.assignee.as_deref());
    print_field("Message", record.message.as_deref());
    if let Some(line) = record.line {
        println!("  {:<11} {line}", "Line:");
    }
    for (name, value) in &record.attributes {
        println!("  {:<11} {value}", format!("{name}:"));
    }
    println!();

    match document {
        Some(doc) if doc.update_date == record.updated_at => {
            println!("{}", "Indexed and current.".green());
        }
        Some(_) => println!("{}", "Indexed, stale until the next sync.".yellow()),
        None => println!("{}", "Not indexed yet.".dimmed()),
    }
    Ok(())
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {:<11} {value}", format!("{label}:"));
    }
}

fn parse_status(input: &str) -> Result<String> {
    normalize_status(input).map_err(|(input, suggestion)| {
        Error::InvalidArgument(format!("Invalid status '{input}'{}", did_you_mean(suggestion)))
    })
}

fn did_you_mean(suggestion: Option<String>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}
