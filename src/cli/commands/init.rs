//! Create the record and document stores.

use crate::config::{resolve_paths, DbPaths};
use crate::error::{Error, Result};
use crate::storage::{SqliteDocumentStore, SqliteRecordStore};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    records: PathBuf,
    index: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `Error::AlreadyInitialized` if the record store exists and
/// `force` is not set, or an error if a database cannot be created.
pub fn execute(
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    force: bool,
    json: bool,
) -> Result<()> {
    let DbPaths { records, index } = resolve_paths(records_db, index_db)?;

    if records.exists() && !force {
        return Err(Error::AlreadyInitialized { path: records });
    }

    for path in [&records, &index] {
        if force && path.exists() {
            fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    // Opening applies the schema
    SqliteRecordStore::open(&records)?;
    SqliteDocumentStore::open(&index)?;

    if json {
        let payload = serde_json::to_string(&InitOutput { records, index })?;
        println!("{payload}");
    } else {
        println!("Initialized issuedex");
        println!("  Records: {}", records.display());
        println!("  Index:   {}", index.display());
        println!();
        println!("Next: 'issuedex project add <KEY>' then 'issuedex issue add'.");
    }

    Ok(())
}
