//! Synchronization of the search projection with the record store.
//!
//! - **Coordinator**: bootstrap and incremental runs under a single-run lock
//! - **Watermark**: persisted high-water mark of synced update times
//! - **Scheduler**: periodic background ticks on tokio
//! - **Status**: operator-facing reporting
//!
//! # Example
//!
//! ```ignore
//! use issuedex::sync::{scheduler, SyncCoordinator};
//!
//! let sync = Arc::new(SyncCoordinator::new(records, documents, &settings)?);
//! let handle = scheduler::spawn(sync.clone(), Duration::from_secs(60));
//! // ...
//! handle.shutdown().await;
//! ```

mod clock;
mod coordinator;
pub mod scheduler;
mod status;
mod types;
mod watermark;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::SyncCoordinator;
pub use scheduler::SchedulerHandle;
pub use status::{print_outcome, print_status};
pub use types::{RunMode, RunOutcome, RunReport, SyncStatus};
pub use watermark::Watermark;
