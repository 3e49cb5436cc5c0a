//! Configuration management.
//!
//! Path resolution for the two databases and the sync tunables.
//!
//! # Layout
//!
//! - **Record store**: `~/.issuedex/data/records.db`
//! - **Document store**: `~/.issuedex/data/index.db`
//! - **Settings**: `~/.issuedex/config.json`

mod settings;

pub use settings::{Settings, ENV_BULK_THRESHOLD, ENV_SYNC_INTERVAL};

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Overrides the record store path.
pub const ENV_RECORD_DB: &str = "ISSUEDEX_RECORD_DB";
/// Overrides the document store path.
pub const ENV_INDEX_DB: &str = "ISSUEDEX_INDEX_DB";
/// Overrides the settings file path.
pub const ENV_CONFIG: &str = "ISSUEDEX_CONFIG";

/// Locations of both databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPaths {
    pub records: PathBuf,
    pub index: PathBuf,
}

/// Get the global Issuedex directory, `~/.issuedex/`.
#[must_use]
pub fn global_issuedex_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".issuedex"))
}

/// Resolve the settings file path.
///
/// `ISSUEDEX_CONFIG` wins over `~/.issuedex/config.json`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    env_path(ENV_CONFIG).or_else(|| global_issuedex_dir().map(|dir| dir.join("config.json")))
}

/// Resolve both database paths.
///
/// Priority, per database:
/// 1. Explicit path from a CLI flag
/// 2. `ISSUEDEX_RECORD_DB` / `ISSUEDEX_INDEX_DB`
/// 3. `~/.issuedex/data/{records,index}.db`
///
/// # Errors
///
/// Returns `Error::Config` if no home directory can be determined and a
/// path was left unresolved.
pub fn resolve_paths(explicit_records: Option<&Path>, explicit_index: Option<&Path>) -> Result<DbPaths> {
    let data_dir = global_issuedex_dir().map(|dir| dir.join("data"));
    let resolve = |explicit: Option<&Path>, env: &str, file: &str| {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| env_path(env))
            .or_else(|| data_dir.as_ref().map(|dir| dir.join(file)))
            .ok_or_else(|| Error::Config("Could not determine home directory".into()))
    };

    Ok(DbPaths {
        records: resolve(explicit_records, ENV_RECORD_DB, "records.db")?,
        index: resolve(explicit_index, ENV_INDEX_DB, "index.db")?,
    })
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
