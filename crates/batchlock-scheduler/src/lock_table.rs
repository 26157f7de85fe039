//! Lock tables: record key to lock stage queue
//!
//! `BatchLockTable` is built by one scheduler thread for one batch and is
//! consumed by exactly one merge into the global `LockTable`. The global
//! table only grows through merges; it only shrinks when a drained head
//! stage passes its lock on.
//!
//! ## Concurrency
//!
//! Each record's queue sits behind its `DashMap` shard lock, which covers
//! queue mutation during merges, head lookups and lock passing. Whole merges
//! are additionally serialized by `merge_batch_table_mutex`, since merge
//! order fixes the relative lock order of batches.

use crate::config::LockTableConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::lock_queue::{BatchLockQueue, LockQueue};
use crate::lock_stage::LockStage;
use batchlock_types::{ActionRef, LockType, RecordKey};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock requests of a single batch
#[derive(Debug, Clone, Default)]
pub struct BatchLockTable {
    lock_table: HashMap<RecordKey, BatchLockQueue>,
}

impl BatchLockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the action's lock requests.
    ///
    /// Write keys become exclusive requests, read keys shared ones. The
    /// action moves to `AwaitingLock`.
    pub fn insert_lock_request(&mut self, request: &ActionRef) -> SchedulerResult<()> {
        request.validate()?;

        for key in request.write_set() {
            self.lock_table
                .entry(*key)
                .or_default()
                .push_request(Arc::clone(request), LockType::Exclusive);
        }
        for key in request.read_set() {
            self.lock_table
                .entry(*key)
                .or_default()
                .push_request(Arc::clone(request), LockType::Shared);
        }

        request.lifecycle().await_locks(request.lock_count());
        Ok(())
    }

    /// Local queue for a record
    pub fn queue(&self, key: &RecordKey) -> Option<&BatchLockQueue> {
        self.lock_table.get(key)
    }

    /// Records with at least one request
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.lock_table.keys()
    }

    /// Number of records with requests
    pub fn len(&self) -> usize {
        self.lock_table.len()
    }

    /// Whether no request was inserted
    pub fn is_empty(&self) -> bool {
        self.lock_table.is_empty()
    }

    fn into_queues(self) -> HashMap<RecordKey, BatchLockQueue> {
        self.lock_table
    }
}

/// Global lock table
///
/// Lives for the lifetime of the pipeline.
pub struct LockTable {
    lock_table: DashMap<RecordKey, LockQueue>,
    merge_batch_table_mutex: Mutex<()>,
    merged_batches: AtomicU64,
}

impl LockTable {
    /// Create a table sized with the default config
    pub fn new() -> Self {
        Self::with_config(&LockTableConfig::default())
    }

    /// Create a table pre-sized for `config.expected_records` records
    pub fn with_config(config: &LockTableConfig) -> Self {
        Self {
            lock_table: DashMap::with_capacity(config.expected_records),
            merge_batch_table_mutex: Mutex::new(()),
            merged_batches: AtomicU64::new(0),
        }
    }

    /// Append a batch's lock queues to the global queues.
    ///
    /// Blocks until no other merge is in flight. Queues that were idle have
    /// their new head stage granted immediately.
    pub fn merge_batch_table(&self, blt: BatchLockTable) {
        let _guard = self.merge_batch_table_mutex.lock();

        let records = blt.len();
        let mut granted = 0usize;
        for (key, local) in blt.into_queues() {
            let mut queue = self.lock_table.entry(key).or_default();
            if queue.merge(local) {
                granted += 1;
            }
        }

        let merged = self.merged_batches.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(merged, records, granted, "merged batch lock table");
    }

    /// Stage currently holding the lock on `key`
    pub fn get_head_for_record(&self, key: &RecordKey) -> Option<Arc<LockStage>> {
        self.lock_table.get(key).and_then(|queue| queue.head())
    }

    /// Retire the drained head stage of `key` and grant the next one
    pub fn pass_lock_to_next_stage_for(&self, key: &RecordKey) -> SchedulerResult<()> {
        let mut queue = self
            .lock_table
            .get_mut(key)
            .ok_or(SchedulerError::NoLockHolder(*key))?;

        match queue.pass_to_next(*key)? {
            Some(next) => tracing::trace!(%key, members = next.len(), "lock passed"),
            None => tracing::trace!(%key, "record idle"),
        }
        Ok(())
    }

    /// Number of stages queued on `key`
    pub fn queue_len(&self, key: &RecordKey) -> usize {
        self.lock_table.get(key).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of records ever locked
    pub fn record_count(&self) -> usize {
        self.lock_table.len()
    }

    /// Number of batch tables merged so far
    pub fn merged_batches(&self) -> u64 {
        self.merged_batches.load(Ordering::Acquire)
    }

    /// Whether no lock is held or requested on any record
    pub fn is_idle(&self) -> bool {
        self.lock_table.iter().all(|entry| entry.value().is_empty())
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
