//! Periodic background sync.
//!
//! The first tick runs [`SyncCoordinator::startup`]; later ticks run
//! incrementally. Each run executes on the blocking pool and the loop waits
//! for it, so ticks that fall due during a long run are dropped rather than
//! queued.

use crate::sync::coordinator::SyncCoordinator;
use crate::sync::types::RunOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for an in-flight run to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Sync scheduler task failed");
        }
    }
}

/// Start ticking every `period` on the current tokio runtime.
#[must_use]
pub fn spawn(coordinator: Arc<SyncCoordinator>, period: Duration) -> SchedulerHandle {
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        info!(period_ms, "Sync scheduler started");
        let mut first = true;

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    let sync = coordinator.clone();
                    let startup = std::mem::take(&mut first);
                    let run = tokio::task::spawn_blocking(move || {
                        if startup {
                            sync.startup()
                        } else {
                            Ok(sync.run_incremental())
                        }
                    });

                    match run.await {
                        Ok(Ok(RunOutcome::Skipped)) => debug!("Tick skipped, run in progress"),
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "Sync tick failed"),
                        Err(e) => error!(error = %e, "Sync run panicked"),
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    });

    SchedulerHandle { shutdown, task }
}
