//! Sync command implementations.

use crate::cli::commands::Workspace;
use crate::cli::SyncCommands;
use crate::error::{Error, Result};
use crate::sync::{print_outcome, print_status, scheduler, RunOutcome, SyncStatus};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Serialize)]
struct StatusOutput<'a> {
    #[serde(flatten)]
    status: &'a SyncStatus,
    records: u64,
}

/// Execute sync commands.
///
/// # Errors
///
/// Returns an error if the stores cannot be opened or the run fails.
pub fn execute(
    command: &SyncCommands,
    records_db: Option<&Path>,
    index_db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let ws = Workspace::open(records_db, index_db)?;
    match command {
        SyncCommands::Run { bootstrap } => {
            let coordinator = ws.coordinator()?;
            let outcome = if *bootstrap {
                coordinator.run_bootstrap()
            } else {
                coordinator.startup()?
            };
            report(outcome, json)
        }
        SyncCommands::Resync => report(ws.coordinator()?.trigger_full_resync(), json),
        SyncCommands::Status => {
            let status = ws.coordinator()?.status()?;
            let records = ws.records.count_issues()?;
            if json {
                let output = StatusOutput {
                    status: &status,
                    records,
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                print_status(&status);
                println!();
                println!("Record store holds {records} issues.");
            }
            Ok(())
        }
        SyncCommands::Watch { interval } => {
            let secs = interval.unwrap_or(ws.settings.sync_interval_secs);
            if secs == 0 {
                return Err(Error::InvalidArgument(
                    "Interval must be at least one second".to_string(),
                ));
            }
            watch(&ws, Duration::from_secs(secs))
        }
    }
}

fn report(outcome: RunOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    outcome_result(outcome)
}

/// Map a run outcome to the command's exit status.
pub(crate) fn outcome_result(outcome: RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed(_) => Ok(()),
        RunOutcome::Skipped => Err(Error::TransientBackend(
            "another sync run is active".to_string(),
        )),
        RunOutcome::Failed {
            error, retryable, ..
        } => Err(if retryable {
            Error::TransientBackend(error)
        } else {
            Error::Other(error)
        }),
    }
}

fn watch(ws: &Workspace, period: Duration) -> Result<()> {
    let coordinator = Arc::new(ws.coordinator()?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let handle = scheduler::spawn(coordinator, period);
        info!("Watching; press Ctrl-C to stop");
        let signal = tokio::signal::ctrl_c().await;
        handle.shutdown().await;
        signal.map_err(Error::from)
    })
}
