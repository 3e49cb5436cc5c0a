//! Reindex command: clear the issue index and bootstrap it again.

use crate::cli::commands::{sync::outcome_result, Workspace};
use crate::error::Result;
use crate::sync::print_outcome;
use std::path::Path;

/// Execute the reindex command.
///
/// # Errors
///
/// Returns an error if the rebuild fails or another run holds the lock.
pub fn execute(records_db: Option<&Path>, index_db: Option<&Path>, json: bool) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    let outcome = ws.coordinator()?.rebuild();

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    outcome_result(outcome)
}
