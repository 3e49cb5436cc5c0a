//! Sync status display.

use crate::sync::types::{RunOutcome, SyncStatus};
use chrono::{DateTime, Utc};
use colored::Colorize;

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    println!("  Indexed issues: {}", status.indexed_issues);
    match status.last_watermark {
        Some(w) => println!("  Watermark:      {}", format_millis(w)),
        None => println!("  Watermark:      {}", "never synced".dimmed()),
    }
    if status.running {
        println!("  {}", "A sync run is in progress.".yellow());
    }
    println!();

    match &status.last_run {
        None => println!("{}", "No run recorded by this process.".dimmed()),
        Some(outcome) => print_outcome(outcome),
    }
}

/// Print the outcome of one run.
pub fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(report) => {
            println!("{} {} run completed", "✓".green(), report.mode);
            println!("  Records read: {}", report.records_read);
            println!("  Indexed:      {}", report.indexed);
            println!("  Pages:        {}", report.pages);
            println!(
                "  Took:         {} ms",
                report.finished_at.saturating_sub(report.started_at)
            );
            if !report.rejected.is_empty() {
                println!("  {} {}", "Skipped:".yellow().bold(), report.rejected.len());
                for rejection in &report.rejected {
                    println!("    {} {}", rejection.key, rejection.reason.dimmed());
                }
            }
        }
        RunOutcome::Failed {
            mode,
            error,
            retryable,
            ..
        } => {
            println!("{} {} run failed: {}", "✗".red(), mode, error);
            if *retryable {
                println!("{}", "  The next scheduled tick will retry.".dimmed());
            }
        }
        RunOutcome::Skipped => {
            println!("{}", "Skipped: another sync run is active.".yellow());
        }
    }
}

/// Render Unix milliseconds as RFC 3339.
fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_millis(i64::MAX), i64::MAX.to_string());
    }
}
