//! Sync run types.

use crate::storage::Rejection;
use serde::Serialize;

/// Which kind of run was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every record, regardless of the watermark.
    Bootstrap,
    /// Records updated after the watermark.
    Incremental,
}

impl RunMode {
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    /// Processing-start time; the watermark candidate.
    pub started_at: i64,
    pub finished_at: i64,
    /// Watermark the run read from; `None` for bootstrap or before any
    /// run has completed.
    pub since: Option<i64>,
    pub records_read: usize,
    pub indexed: usize,
    /// Records skipped because their document did not conform.
    pub rejected: Vec<Rejection>,
    pub pages: usize,
    /// Watermark after the run.
    pub watermark: i64,
}

/// Result of one attempt to run sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    /// Aborted; the watermark kept its previous value.
    Failed {
        mode: RunMode,
        started_at: i64,
        error: String,
        retryable: bool,
    },
    /// Another run held the lock.
    Skipped,
}

impl RunOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Operator view of sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub last_watermark: Option<i64>,
    /// Most recent run that was not skipped.
    pub last_run: Option<RunOutcome>,
    pub indexed_issues: u64,
    pub running: bool,
}
