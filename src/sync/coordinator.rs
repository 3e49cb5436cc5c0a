//! Record store to search projection synchronization.
//!
//! # Run modes
//!
//! - **Bootstrap** reads every record.
//! - **Incremental** reads records updated after the watermark.
//!
//! Both page through the record store by `(updated_at, key)`, map each page
//! to documents, and bulk-upsert it. Only once every page has committed does
//! the watermark advance, to the time the run *started*. Records committed
//! while the run was reading are picked up again by the next run; upserts
//! are idempotent so reprocessing is harmless.
//!
//! A failure reading the record store or writing the index aborts the run
//! with the watermark untouched. Documents that do not conform to the index
//! schema are skipped and reported without aborting.
//!
//! # Concurrency
//!
//! One run at a time, across every process sharing the index. Within a
//! process the run lock owns the [`Watermark`]. Across processes a lease row
//! in the document store marks the active run; it is renewed before each
//! page and expires if its holder dies. A run attempted while another is
//! active, here or elsewhere, returns [`RunOutcome::Skipped`] immediately.
//!
//! The watermark is reloaded at the start of every run and raised by the
//! store itself, so a stale process can never lower it.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::index::{to_document, IssueIndex};
use crate::model::{IssueDocument, IssueRow, RecordCursor};
use crate::storage::{DocumentStore, RecordStore};
use crate::sync::clock::{Clock, SystemClock};
use crate::sync::types::{RunMode, RunOutcome, RunReport, SyncStatus};
use crate::sync::watermark::Watermark;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SYNC_LEASE: &str = "issues.sync";

pub struct SyncCoordinator {
    records: Arc<dyn RecordStore>,
    documents: Arc<dyn DocumentStore>,
    issues: IssueIndex,
    clock: Arc<dyn Clock>,
    page_size: usize,
    /// Lease owner id, unique per coordinator.
    owner: String,
    lease_ttl_ms: i64,
    run_lock: Mutex<Watermark>,
    /// Watermark as of the last run, readable while a run holds the lock.
    published: RwLock<Option<i64>>,
    last_run: RwLock<Option<RunOutcome>>,
}

impl SyncCoordinator {
    /// Create a coordinator, loading the persisted watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the collections cannot be declared or the
    /// watermark cannot be read.
    pub fn new(
        records: Arc<dyn RecordStore>,
        documents: Arc<dyn DocumentStore>,
        settings: &Settings,
    ) -> Result<Self> {
        let issues = IssueIndex::new(documents.clone())?;
        let watermark = Watermark::load(documents.clone())?;
        let published = watermark.get();

        Ok(Self {
            records,
            documents,
            issues,
            clock: Arc::new(SystemClock),
            page_size: settings.page_size.max(1),
            owner: format!("{}-{}", std::process::id(), Uuid::new_v4()),
            lease_ttl_ms: i64::try_from(settings.lease_ttl_secs.saturating_mul(1000))
                .unwrap_or(i64::MAX),
            run_lock: Mutex::new(watermark),
            published: RwLock::new(published),
            last_run: RwLock::new(None),
        })
    }

    /// Replace the clock used to stamp runs.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn issues(&self) -> &IssueIndex {
        &self.issues
    }

    /// Bootstrap if the issue index is empty, otherwise run incrementally.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be counted.
    pub fn startup(&self) -> Result<RunOutcome> {
        if self.issues.count_all()? == 0 {
            info!("Issue index is empty, bootstrapping");
            Ok(self.run_bootstrap())
        } else {
            Ok(self.run_incremental())
        }
    }

    /// Index every record.
    pub fn run_bootstrap(&self) -> RunOutcome {
        self.run(RunMode::Bootstrap, false)
    }

    /// Index records updated since the watermark.
    pub fn run_incremental(&self) -> RunOutcome {
        self.run(RunMode::Incremental, false)
    }

    /// Operator-triggered full resync: reprocess every record.
    pub fn trigger_full_resync(&self) -> RunOutcome {
        info!("Full resync requested");
        self.run(RunMode::Bootstrap, false)
    }

    /// Clear the issue index, then bootstrap it.
    ///
    /// Readers see an empty or partial index until the run completes.
    pub fn rebuild(&self) -> RunOutcome {
        info!("Index rebuild requested");
        self.run(RunMode::Bootstrap, true)
    }

    /// Snapshot for operators.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or the run lease cannot be read.
    pub fn status(&self) -> Result<SyncStatus> {
        let running = self.run_lock.is_locked()
            || self
                .documents
                .lease_holder(SYNC_LEASE, self.clock.now_millis())?
                .is_some();
        Ok(SyncStatus {
            last_watermark: *self.published.read(),
            last_run: self.last_run.read().clone(),
            indexed_issues: self.issues.count_all()?,
            running,
        })
    }

    fn run(&self, mode: RunMode, clear_first: bool) -> RunOutcome {
        let Some(mut watermark) = self.run_lock.try_lock() else {
            info!(%mode, "Sync already running, skipping");
            return RunOutcome::Skipped;
        };

        let started_at = self.clock.now_millis();
        let result = match self.documents.acquire_lease(
            SYNC_LEASE,
            &self.owner,
            started_at,
            self.lease_ttl_ms,
        ) {
            Ok(false) => {
                info!(%mode, "Sync running in another process, skipping");
                return RunOutcome::Skipped;
            }
            Ok(true) => {
                let result = watermark
                    .reload()
                    .and_then(|()| self.execute(mode, clear_first, started_at, &mut watermark));
                if let Err(e) = self.documents.release_lease(SYNC_LEASE, &self.owner) {
                    warn!(error = %e, "Failed to release sync lease; it will expire");
                }
                result
            }
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(report) => {
                info!(
                    %mode,
                    read = report.records_read,
                    indexed = report.indexed,
                    rejected = report.rejected.len(),
                    pages = report.pages,
                    watermark = report.watermark,
                    "Sync run completed"
                );
                RunOutcome::Completed(report)
            }
            Err(e) => {
                warn!(%mode, error = %e, retryable = e.is_transient(), "Sync run aborted, watermark unchanged");
                RunOutcome::Failed {
                    mode,
                    started_at,
                    error: e.to_string(),
                    retryable: e.is_transient(),
                }
            }
        };

        *self.published.write() = watermark.get();
        *self.last_run.write() = Some(outcome.clone());
        outcome
    }

    fn execute(
        &self,
        mode: RunMode,
        clear_first: bool,
        started_at: i64,
        watermark: &mut Watermark,
    ) -> Result<RunReport> {
        if clear_first {
            let removed = self.issues.clear()?;
            info!(removed, "Cleared issue index");
        }

        let since = match mode {
            RunMode::Bootstrap => None,
            RunMode::Incremental => watermark.get(),
        };

        let mut report = RunReport {
            mode,
            started_at,
            finished_at: started_at,
            since,
            records_read: 0,
            indexed: 0,
            rejected: Vec::new(),
            pages: 0,
            watermark: started_at,
        };

        let mut resume: Option<RecordCursor> = None;
        loop {
            self.renew_lease()?;
            let page = self.records.find_updated_after(
                since.unwrap_or(i64::MIN),
                resume.as_ref(),
                self.page_size,
            )?;
            if page.is_empty() {
                break;
            }

            let docs: Vec<IssueDocument> = page
                .iter()
                .map(|row| to_document(&row.record, &row.keys))
                .collect();
            let bulk = self.issues.bulk_upsert(&docs)?;

            for rejection in &bulk.rejected {
                warn!(key = %rejection.key, reason = %rejection.reason, "Skipped issue");
            }
            debug!(page = report.pages, size = page.len(), committed = bulk.committed, "Indexed page");

            report.pages += 1;
            report.records_read += page.len();
            report.indexed += bulk.committed;
            report.rejected.extend(bulk.rejected);

            if page.len() < self.page_size {
                break;
            }
            resume = page.last().map(IssueRow::cursor);
        }

        report.watermark = watermark.advance(started_at)?;
        report.finished_at = self.clock.now_millis();
        Ok(report)
    }

    fn renew_lease(&self) -> Result<()> {
        let now = self.clock.now_millis();
        if self
            .documents
            .acquire_lease(SYNC_LEASE, &self.owner, now, self.lease_ttl_ms)?
        {
            Ok(())
        } else {
            Err(Error::TransientBackend(
                "sync lease taken over by another process".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueRecord;
    use crate::storage::{
        BulkReport, CollectionSchema, DocumentWrite, Filter, SqliteDocumentStore,
        SqliteRecordStore,
    };
    use crate::sync::clock::ManualClock;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct Fixture {
        records: Arc<SqliteRecordStore>,
        documents: Arc<SqliteDocumentStore>,
        clock: Arc<ManualClock>,
        rule: i64,
        project: i64,
        file: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let records = Arc::new(SqliteRecordStore::open_memory().unwrap());
            let rule = records.insert_rule("xoo", "x1").unwrap();
            let project = records.insert_project("P1").unwrap();
            let file = records.insert_component("P1:src/a.rs", project).unwrap();
            Self {
                records,
                documents: Arc::new(SqliteDocumentStore::open_memory().unwrap()),
                clock: Arc::new(ManualClock::new(1_000)),
                rule,
                project,
                file,
            }
        }

        fn coordinator(&self, page_size: usize) -> SyncCoordinator {
            let settings = Settings {
                page_size,
                ..Settings::default()
            };
            SyncCoordinator::new(self.records.clone(), self.documents.clone(), &settings)
                .unwrap()
                .with_clock(self.clock.clone())
        }

        fn save(&self, key: &str, updated_at: i64) {
            let mut record = IssueRecord::new(key, updated_at);
            record.rule_id = Some(self.rule);
            record.root_component_id = Some(self.project);
            record.component_id = Some(self.file);
            record.status = Some("OPEN".to_string());
            record.severity = Some("MAJOR".to_string());
            self.records.save_issue(&record).unwrap();
        }
    }

    #[test]
    fn test_bootstrap_indexes_everything_and_sets_start_time() {
        let fx = Fixture::new();
        fx.save("A", 10);
        fx.save("B", 5_000);

        let sync = fx.coordinator(100);
        let report = sync.run_bootstrap().report().cloned().unwrap();
        assert_eq!(report.records_read, 2);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.since, None);
        assert_eq!(report.watermark, 1_000);
        assert_eq!(sync.issues().count_all().unwrap(), 2);
    }

    #[test]
    fn test_incremental_reads_only_after_watermark() {
        let fx = Fixture::new();
        fx.save("A", 500);
        let sync = fx.coordinator(100);
        sync.run_bootstrap();

        fx.save("B", 1_500);
        fx.clock.set(2_000);
        let report = sync.run_incremental().report().cloned().unwrap();
        assert_eq!(report.since, Some(1_000));
        assert_eq!(report.records_read, 1);
        assert_eq!(report.watermark, 2_000);
        assert_eq!(sync.issues().count_all().unwrap(), 2);
    }

    #[test]
    fn test_watermark_never_decreases() {
        let fx = Fixture::new();
        fx.save("A", 500);
        let sync = fx.coordinator(100);
        fx.clock.set(5_000);
        sync.run_bootstrap();

        // Clock stepped backwards
        fx.clock.set(3_000);
        let report = sync.run_incremental().report().cloned().unwrap();
        assert_eq!(report.watermark, 5_000);
        assert_eq!(sync.status().unwrap().last_watermark, Some(5_000));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let fx = Fixture::new();
        for key in ["A", "B", "C"] {
            fx.save(key, 2_000);
        }
        let sync = fx.coordinator(100);
        sync.run_incremental();
        let before: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|k| sync.issues().get_by_key(k).unwrap())
            .collect();

        // Records newer than the clock are read again
        let again = sync.run_incremental().report().cloned().unwrap();
        assert_eq!(again.records_read, 3);

        let after: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|k| sync.issues().get_by_key(k).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(sync.issues().count_all().unwrap(), 3);
    }

    #[test]
    fn test_pages_through_records() {
        let fx = Fixture::new();
        for (i, key) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            fx.save(key, 100 + (i as i64 / 2));
        }
        let sync = fx.coordinator(2);
        let report = sync.run_bootstrap().report().cloned().unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.indexed, 5);
    }

    #[test]
    fn test_nonconforming_record_is_skipped() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let mut orphan = IssueRecord::new("ORPHAN", 100);
        orphan.root_component_id = Some(999);
        fx.records.save_issue(&orphan).unwrap();
        fx.save("Z", 100);

        let sync = fx.coordinator(100);
        let report = sync.run_bootstrap().report().cloned().unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].key, "ORPHAN");
        assert_eq!(report.watermark, 1_000);
    }

    /// Document store failing bulk writes after `healthy` successful ones.
    struct FailingIndex {
        inner: Arc<SqliteDocumentStore>,
        healthy: AtomicUsize,
        broken: AtomicBool,
    }

    impl DocumentStore for FailingIndex {
        fn define(&self, schema: CollectionSchema) -> Result<()> {
            self.inner.define(schema)
        }
        fn upsert(&self, write: DocumentWrite) -> Result<()> {
            self.inner.upsert(write)
        }
        fn bulk_upsert(&self, writes: Vec<DocumentWrite>) -> Result<BulkReport> {
            if self.broken.load(Ordering::SeqCst) {
                let left = self.healthy.load(Ordering::SeqCst);
                if left == 0 {
                    return Err(Error::TransientBackend("index unreachable".to_string()));
                }
                self.healthy.store(left - 1, Ordering::SeqCst);
            }
            self.inner.bulk_upsert(writes)
        }
        fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
            self.inner.get(collection, key)
        }
        fn query(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Value>> {
            self.inner.query(collection, filter, limit)
        }
        fn count(&self, collection: &str) -> Result<u64> {
            self.inner.count(collection)
        }
        fn clear(&self, collection: &str) -> Result<u64> {
            self.inner.clear(collection)
        }
        fn load_state(&self, name: &str) -> Result<Option<i64>> {
            self.inner.load_state(name)
        }
        fn advance_state(&self, name: &str, candidate: i64) -> Result<i64> {
            self.inner.advance_state(name, candidate)
        }
        fn acquire_lease(&self, name: &str, owner: &str, now: i64, ttl_ms: i64) -> Result<bool> {
            self.inner.acquire_lease(name, owner, now, ttl_ms)
        }
        fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
            self.inner.release_lease(name, owner)
        }
        fn lease_holder(&self, name: &str, now: i64) -> Result<Option<String>> {
            self.inner.lease_holder(name, now)
        }
    }

    #[test]
    fn test_index_failure_mid_batch_keeps_watermark() {
        let fx = Fixture::new();
        for key in ["A", "B", "C", "D"] {
            fx.save(key, 1_500);
        }
        let index = Arc::new(FailingIndex {
            inner: fx.documents.clone(),
            healthy: AtomicUsize::new(1),
            broken: AtomicBool::new(true),
        });
        let settings = Settings {
            page_size: 2,
            ..Settings::default()
        };
        let sync = SyncCoordinator::new(fx.records.clone(), index.clone(), &settings)
            .unwrap()
            .with_clock(fx.clock.clone());

        match sync.run_incremental() {
            RunOutcome::Failed { retryable, .. } => assert!(retryable),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(sync.status().unwrap().last_watermark, None);
        assert_eq!(fx.documents.load_state("issues.watermark").unwrap(), None);

        // Backend recovers; the whole interval is reprocessed
        index.broken.store(false, Ordering::SeqCst);
        let report = sync.run_incremental().report().cloned().unwrap();
        assert_eq!(report.since, None);
        assert_eq!(report.indexed, 4);
        assert_eq!(report.watermark, 1_000);
    }

    /// Record store that is down, or that parks inside a read until released.
    struct GatedRecords {
        inner: Arc<SqliteRecordStore>,
        down: AtomicBool,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl RecordStore for GatedRecords {
        fn get_by_key(&self, key: &str) -> Result<Option<IssueRow>> {
            self.inner.get_by_key(key)
        }
        fn find_updated_after(
            &self,
            since: i64,
            resume: Option<&RecordCursor>,
            limit: usize,
        ) -> Result<Vec<IssueRow>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::TransientBackend("record store offline".to_string()));
            }
            if let Some((entered, release)) = self.gate.lock().take() {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.find_updated_after(since, resume, limit)
        }
    }

    #[test]
    fn test_record_store_failure_keeps_watermark() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let records = Arc::new(GatedRecords {
            inner: fx.records.clone(),
            down: AtomicBool::new(true),
            gate: Mutex::new(None),
        });
        let sync = SyncCoordinator::new(records.clone(), fx.documents.clone(), &Settings::default())
            .unwrap()
            .with_clock(fx.clock.clone());

        assert!(!sync.run_incremental().is_completed());
        let status = sync.status().unwrap();
        assert_eq!(status.last_watermark, None);
        assert!(matches!(status.last_run, Some(RunOutcome::Failed { .. })));

        // The failed run gave up its lease
        assert_eq!(fx.documents.lease_holder(SYNC_LEASE, 1_000).unwrap(), None);

        records.down.store(false, Ordering::SeqCst);
        assert!(sync.run_incremental().is_completed());
        assert_eq!(sync.status().unwrap().last_watermark, Some(1_000));
    }

    #[test]
    fn test_concurrent_run_is_skipped() {
        let fx = Fixture::new();
        fx.save("A", 100);

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let records = Arc::new(GatedRecords {
            inner: fx.records.clone(),
            down: AtomicBool::new(false),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        let sync = Arc::new(
            SyncCoordinator::new(records, fx.documents.clone(), &Settings::default()).unwrap(),
        );

        let background = {
            let sync = sync.clone();
            std::thread::spawn(move || sync.run_incremental())
        };
        entered_rx.recv().unwrap();

        assert_eq!(sync.run_incremental(), RunOutcome::Skipped);
        assert!(sync.status().unwrap().running);

        release_tx.send(()).unwrap();
        assert!(background.join().unwrap().is_completed());
        // Skips are not recorded as the last run
        assert!(sync.status().unwrap().last_run.unwrap().is_completed());
    }

    #[test]
    fn test_lease_held_elsewhere_skips_run() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let sync = fx.coordinator(100);
        assert!(fx
            .documents
            .acquire_lease(SYNC_LEASE, "other-process", 900, 60_000)
            .unwrap());

        assert_eq!(sync.run_bootstrap(), RunOutcome::Skipped);
        assert!(sync.status().unwrap().running);
        assert_eq!(sync.issues().count_all().unwrap(), 0);

        fx.documents.release_lease(SYNC_LEASE, "other-process").unwrap();
        assert!(sync.run_bootstrap().is_completed());
        assert!(!sync.status().unwrap().running);
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        let fx = Fixture::new();
        fx.save("A", 100);
        // Holder crashed; its lease ran out at 500
        fx.documents
            .acquire_lease(SYNC_LEASE, "crashed", 0, 500)
            .unwrap();

        let sync = fx.coordinator(100);
        assert!(sync.run_bootstrap().is_completed());
        assert_eq!(fx.documents.lease_holder(SYNC_LEASE, 1_000).unwrap(), None);
    }

    #[test]
    fn test_run_in_another_process_is_skipped() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("index.db");

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let parked = Arc::new(GatedRecords {
            inner: fx.records.clone(),
            down: AtomicBool::new(false),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        let first = Arc::new(
            SyncCoordinator::new(
                parked,
                Arc::new(SqliteDocumentStore::open(&path).unwrap()),
                &Settings::default(),
            )
            .unwrap()
            .with_clock(fx.clock.clone()),
        );
        let second = SyncCoordinator::new(
            fx.records.clone(),
            Arc::new(SqliteDocumentStore::open(&path).unwrap()),
            &Settings::default(),
        )
        .unwrap()
        .with_clock(fx.clock.clone());

        let background = {
            let first = first.clone();
            std::thread::spawn(move || first.run_bootstrap())
        };
        entered_rx.recv().unwrap();

        // Separate connection, separate run lock: only the lease stops it
        assert_eq!(second.rebuild(), RunOutcome::Skipped);
        assert!(second.status().unwrap().running);

        release_tx.send(()).unwrap();
        assert!(background.join().unwrap().is_completed());
        assert!(second.run_incremental().is_completed());
    }

    #[test]
    fn test_first_incremental_reads_early_records() {
        let fx = Fixture::new();
        fx.save("EPOCH", 0);
        fx.save("BEFORE", -5);
        fx.save("AFTER", 10);

        let report = fx.coordinator(100).run_incremental().report().cloned().unwrap();
        assert_eq!(report.since, None);
        assert_eq!(report.records_read, 3);
        assert_eq!(report.indexed, 3);
    }

    #[test]
    fn test_startup_bootstraps_empty_index() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let sync = fx.coordinator(100);

        let first = sync.startup().unwrap();
        assert_eq!(first.report().map(|r| r.mode), Some(RunMode::Bootstrap));

        let second = sync.startup().unwrap();
        assert_eq!(second.report().map(|r| r.mode), Some(RunMode::Incremental));
    }

    #[test]
    fn test_rebuild_clears_then_reindexes() {
        let fx = Fixture::new();
        fx.save("A", 100);
        let sync = fx.coordinator(100);
        sync.run_bootstrap();

        // A stray document not backed by a record
        let mut stray = sync.issues().get_by_key("A").unwrap().unwrap();
        stray.key = "STRAY".to_string();
        sync.issues().upsert(&stray).unwrap();
        assert_eq!(sync.issues().count_all().unwrap(), 2);

        assert!(sync.rebuild().is_completed());
        assert_eq!(sync.issues().count_all().unwrap(), 1);
        assert!(sync.issues().get_by_key("STRAY").unwrap().is_none());
    }

    #[test]
    fn test_watermark_survives_restart() {
        let fx = Fixture::new();
        fx.save("A", 100);
        fx.coordinator(100).run_bootstrap();

        let restarted = fx.coordinator(100);
        assert_eq!(restarted.status().unwrap().last_watermark, Some(1_000));
        assert_eq!(restarted.status().unwrap().last_run, None);
    }
}
