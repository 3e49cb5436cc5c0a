//! Project command implementations.

use crate::cli::commands::Workspace;
use crate::cli::ProjectCommands;
use crate::error::Result;
use colored::Colorize;
use std::path::Path;

/// Execute project commands.
///
/// # Errors
///
/// Returns an error if the stores cannot be opened or a write fails.
pub fn execute(
    command: &ProjectCommands,
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    match command {
        ProjectCommands::Add { key } => add(&ws, key, json),
    }
}

fn add(ws: &Workspace, key: &str, json: bool) -> Result<()> {
    let id = ws.records.insert_project(key)?;
    // Issues route to their project document; make sure it exists before
    // the next sync indexes anything under it.
    ws.permissions()?.upsert_project(key)?;

    if json {
        println!("{}", serde_json::json!({ "key": key, "id": id }));
    } else {
        println!("Registered project {}", key.bold());
    }
    Ok(())
}
