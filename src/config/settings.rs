//! Sync tunables.
//!
//! Loaded from `~/.issuedex/config.json` (every field optional), then
//! overridden by environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Overrides `sync_interval_secs`.
pub const ENV_SYNC_INTERVAL: &str = "ISSUEDEX_SYNC_INTERVAL_SECS";
/// Overrides `bulk_flush_threshold`.
pub const ENV_BULK_THRESHOLD: &str = "ISSUEDEX_BULK_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Seconds between scheduled sync ticks.
    pub sync_interval_secs: u64,
    /// Buffered writes before a bulk writer flushes.
    pub bulk_flush_threshold: usize,
    /// Records fetched per page during a sync run.
    pub page_size: usize,
    /// SQLite busy timeout.
    pub busy_timeout_ms: u64,
    /// How long a sync run's cross-process lease lasts without renewal.
    /// Renewed before every page, so it only bounds recovery after a crash.
    pub lease_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_interval_secs: 60,
            bulk_flush_threshold: 500,
            page_size: 1000,
            busy_timeout_ms: 5000,
            lease_ttl_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from the default config file and the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file or an override is malformed.
    pub fn load() -> Result<Self> {
        let settings = match super::config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings
            .with_overrides(|name| std::env::var(name).ok())?
            .validated()
    }

    /// Read settings from a JSON file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
    }

    /// Apply overrides looked up by variable name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an override is not a number.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SYNC_INTERVAL).filter(|v| !v.trim().is_empty()) {
            self.sync_interval_secs = parse_number(ENV_SYNC_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BULK_THRESHOLD).filter(|v| !v.trim().is_empty()) {
            self.bulk_flush_threshold = parse_number(ENV_BULK_THRESHOLD, &raw)?;
        }
        Ok(self)
    }

    /// Reject zero-valued tunables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn validated(self) -> Result<Self> {
        let zero = [
            ("syncIntervalSecs", self.sync_interval_secs == 0),
            ("bulkFlushThreshold", self.bulk_flush_threshold == 0),
            ("pageSize", self.page_size == 0),
            ("leaseTtlSecs", self.lease_ttl_secs == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(Error::Config(format!("{name} must be greater than zero"))),
            None => Ok(self),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a positive integer, got '{raw}'")))
}
