//! Grant command implementations.

use crate::cli::commands::Workspace;
use crate::cli::GrantCommands;
use crate::error::{Error, Result};
use crate::model::PermissionGrant;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct GrantOutput<'a> {
    key: &'a str,
    project: &'a str,
    user: Option<&'a str>,
    group: Option<&'a str>,
}

/// One entry of a grant import file.
#[derive(Debug, Deserialize)]
struct GrantEntry {
    project: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

#[derive(Serialize)]
struct ImportOutput {
    grants: usize,
}

/// Execute grant commands.
///
/// # Errors
///
/// Returns `Error::Validation` unless exactly one of user or group is given.
pub fn execute(
    command: &GrantCommands,
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    match command {
        GrantCommands::Add {
            project,
            user,
            group,
        } => {
            let key = ws
                .permissions()?
                .add_grant(project, user.as_deref(), group.as_deref())?;

            if json {
                let output = GrantOutput {
                    key: &key,
                    project,
                    user: user.as_deref(),
                    group: group.as_deref(),
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("Granted read on {} to {}", project.bold(), grantee(user.as_deref(), group.as_deref()));
            }
            Ok(())
        }
        GrantCommands::Import { file } => import(&ws, file, json),
    }
}

/// Load every grant of `file` through one bulk writer.
///
/// Entries are validated up front so a malformed one aborts before any write.
fn import(ws: &Workspace, file: &Path, json: bool) -> Result<()> {
    let raw = fs::read_to_string(file)?;
    let entries: Vec<GrantEntry> = serde_json::from_str(&raw)?;

    for (i, entry) in entries.iter().enumerate() {
        PermissionGrant::read(
            &entry.project,
            entry.user.as_deref(),
            entry.group.as_deref(),
        )
        .map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("entry {i}: {msg}")),
            other => other,
        })?;
    }

    let permissions = ws.permissions()?;
    let mut bulk = permissions.bulk(ws.settings.bulk_flush_threshold);
    for entry in &entries {
        bulk.add_grant(&entry.project, entry.user.as_deref(), entry.group.as_deref())?;
    }
    bulk.flush()?;
    info!(grants = entries.len(), file = %file.display(), "Imported grants");

    if json {
        let output = ImportOutput {
            grants: entries.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Imported {} grants", entries.len());
    }
    Ok(())
}

fn grantee(user: Option<&str>, group: Option<&str>) -> String {
    match (user, group) {
        (Some(user), _) if !user.is_empty() => format!("user {user}"),
        (_, Some(group)) => format!("group {group}"),
        _ => String::new(),
    }
}
