//! Synchronization of TMDB records into the catalog store.
//!
//! [`CatalogSync`] upserts one record at a time. [`SyncQueue`] runs it in the
//! background: list and search requests submit the raw page as a
//! [`SyncBatch`] and return without waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{CatalogItem, MediaKind};
use crate::record::{CatalogRecord, RecordError};
use crate::store::{CatalogStore, UpsertOutcome};

/// Upserts raw TMDB objects into the catalog store
#[derive(Clone)]
pub struct CatalogSync {
    store: Arc<dyn CatalogStore>,
}

impl CatalogSync {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Sync one list/search result. `Ok(None)` means the record was skipped.
    pub async fn sync_record(
        &self,
        raw: &Value,
        default_kind: Option<MediaKind>,
    ) -> CatalogResult<Option<CatalogItem>> {
        match CatalogRecord::from_raw_as(raw, default_kind) {
            Ok(record) => self.write(&record).await.map(Some),
            Err(e) => {
                skip(raw, &e);
                Ok(None)
            }
        }
    }

    /// Sync a detail payload, extended attributes included
    pub async fn sync_details(&self, raw: &Value) -> CatalogResult<Option<CatalogItem>> {
        match CatalogRecord::from_details(raw) {
            Ok(record) => self.write(&record).await.map(Some),
            Err(e) => {
                skip(raw, &e);
                Ok(None)
            }
        }
    }

    async fn write(&self, record: &CatalogRecord) -> CatalogResult<CatalogItem> {
        let upserted = self.store.upsert(record).await?;
        match upserted.outcome {
            UpsertOutcome::Inserted => debug!(tmdb_id = record.tmdb_id, "Catalog item created"),
            UpsertOutcome::Updated => debug!(tmdb_id = record.tmdb_id, "Catalog item updated"),
            UpsertOutcome::Unchanged => {}
        }
        Ok(upserted.item)
    }
}

fn skip(raw: &Value, reason: &RecordError) {
    let tmdb_id = raw.get("id").and_then(Value::as_i64);
    match reason {
        RecordError::NotCatalogItem(..) => debug!(?tmdb_id, %reason, "Ignoring record"),
        RecordError::MissingId | RecordError::MissingTitle(_) => {
            warn!(target: "dead_letter", ?tmdb_id, %reason, "Skipping unusable record")
        }
    }
}

/// A page of raw records to sync
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub records: Vec<Value>,
    /// Kind assumed for records without `media_type`
    pub default_kind: Option<MediaKind>,
}

impl SyncBatch {
    pub fn new(records: Vec<Value>, default_kind: Option<MediaKind>) -> Self {
        Self {
            records,
            default_kind,
        }
    }
}

/// Background sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workers: usize,
    /// Batches that can wait before `submit` blocks
    pub queue_capacity: usize,
    /// Attempts per record, first try included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub backoff_base: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SYNC_WORKERS`: worker tasks (default: 2)
    /// - `SYNC_QUEUE_CAPACITY`: queued batches before `submit` waits (default: 64)
    /// - `SYNC_MAX_ATTEMPTS`: attempts per record (default: 3)
    /// - `SYNC_BACKOFF_MS`: first retry delay in milliseconds (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |var: &str| std::env::var(var).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            workers: read("SYNC_WORKERS")
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.workers),
            queue_capacity: read("SYNC_QUEUE_CAPACITY")
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.queue_capacity),
            max_attempts: read("SYNC_MAX_ATTEMPTS")
                .map(|v| v.clamp(1, 10) as u32)
                .unwrap_or(defaults.max_attempts),
            backoff_base: read("SYNC_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    synced: AtomicU64,
    skipped: AtomicU64,
    dead_lettered: AtomicU64,
    dropped_batches: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            batches: self.batches.load(Ordering::Relaxed),
            synced: self.synced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
        }
    }
}

/// Totals across all workers since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub batches: u64,
    pub synced: u64,
    pub skipped: u64,
    pub dead_lettered: u64,
    /// Batches refused by [`SyncHandle::try_submit`] because the queue was full
    pub dropped_batches: u64,
}

/// Cloneable submitter for the sync queue
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncBatch>,
    counters: Arc<Counters>,
}

impl SyncHandle {
    /// Queue a batch, waiting for room when the queue is full
    pub async fn submit(&self, batch: SyncBatch) -> CatalogResult<()> {
        if batch.records.is_empty() {
            return Ok(());
        }

        self.tx
            .send(batch)
            .await
            .map_err(|_| CatalogError::QueueClosed)
    }

    /// Queue a batch without waiting.
    ///
    /// A full queue drops the batch and logs it as a dead letter; the records
    /// are picked up again the next time TMDB returns them.
    pub fn try_submit(&self, batch: SyncBatch) -> CatalogResult<()> {
        if batch.records.is_empty() {
            return Ok(());
        }

        match self.tx.try_send(batch) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(batch)) => {
                self.counters.dropped_batches.fetch_add(1, Ordering::Relaxed);
                let tmdb_ids: Vec<i64> = batch
                    .records
                    .iter()
                    .filter_map(|raw| raw.get("id").and_then(|id| id.as_i64()))
                    .collect();
                warn!(target: "dead_letter", ?tmdb_ids, "Sync queue full, dropping batch");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CatalogError::QueueClosed),
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }
}

/// Bounded batch queue drained by a fixed pool of workers
pub struct SyncQueue {
    handle: SyncHandle,
    workers: Vec<JoinHandle<()>>,
}

impl SyncQueue {
    /// Spawn the workers on the current runtime
    pub fn start(sync: CatalogSync, config: &SyncConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let worker = SyncWorker {
                    id,
                    rx: Arc::clone(&rx),
                    sync: sync.clone(),
                    counters: Arc::clone(&counters),
                    max_attempts: config.max_attempts.max(1),
                    backoff_base: config.backoff_base,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = config.workers,
            capacity = config.queue_capacity,
            "Sync queue started"
        );

        Self {
            handle: SyncHandle { tx, counters },
            workers,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> SyncStats {
        self.handle.stats()
    }

    /// Stop accepting batches and wait until queued ones are processed.
    ///
    /// Completes once every outstanding [`SyncHandle`] is dropped as well.
    pub async fn shutdown(self) -> SyncStats {
        let Self { handle, workers } = self;
        let counters = Arc::clone(&handle.counters);
        drop(handle);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Sync worker panicked");
            }
        }

        let stats = counters.snapshot();
        info!(?stats, "Sync queue drained");
        stats
    }
}

struct SyncWorker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SyncBatch>>>,
    sync: CatalogSync,
    counters: Arc<Counters>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl SyncWorker {
    async fn run(self) {
        debug!(worker = self.id, "Sync worker started");

        loop {
            // Lock only while waiting for the next batch
            let batch = { self.rx.lock().await.recv().await };
            match batch {
                Some(batch) => self.process(batch).await,
                None => break,
            }
        }

        debug!(worker = self.id, "Sync worker stopped");
    }

    async fn process(&self, batch: SyncBatch) {
        let (mut synced, mut skipped, mut failed) = (0u64, 0u64, 0u64);

        for raw in &batch.records {
            match self.sync_with_retry(raw, batch.default_kind).await {
                Ok(Some(_)) => synced += 1,
                Ok(None) => skipped += 1,
                Err(_) => failed += 1,
            }
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters.synced.fetch_add(synced, Ordering::Relaxed);
        self.counters.skipped.fetch_add(skipped, Ordering::Relaxed);
        self.counters.dead_lettered.fetch_add(failed, Ordering::Relaxed);

        info!(
            worker = self.id,
            records = batch.records.len(),
            synced,
            skipped,
            failed,
            "Sync batch processed"
        );
    }

    async fn sync_with_retry(
        &self,
        raw: &Value,
        default_kind: Option<MediaKind>,
    ) -> CatalogResult<Option<CatalogItem>> {
        let mut attempt = 1;

        loop {
            match self.sync.sync_record(raw, default_kind).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt - 1));
                    debug!(
                        tmdb_id = ?raw.get("id"),
                        attempt,
                        error = %e,
                        "Record sync failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let tmdb_id = raw.get("id").and_then(|id| id.as_i64());
                    warn!(
                        target: "dead_letter",
                        ?tmdb_id,
                        attempts = attempt,
                        error = %e,
                        "Giving up on record"
                    );
                    return Err(e);
                }
            }
        }
    }
}
