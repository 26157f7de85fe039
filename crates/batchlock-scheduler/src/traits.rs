//! Seams between scheduler threads, the scheduling system and executors

use crate::error::SchedulerResult;
use crate::lock_stage::LockStage;
use crate::lock_table::BatchLockTable;
use batchlock_types::{ActionRef, RecordKey};
use std::sync::Arc;

/// Actions of a batch in slot order
pub type OrderedWorkload = Vec<ActionRef>;

/// A sealed batch handed to one scheduler thread
#[derive(Debug, Clone)]
pub struct SchedulerThreadBatch {
    /// Globally unique, gapless id assigned at hand-out
    pub batch_id: u64,
    /// Actions in arrival order
    pub batch: Vec<ActionRef>,
}

impl SchedulerThreadBatch {
    /// Number of actions in the batch
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether the batch carries no actions
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Executor-side operations used by the scheduling system and by executor threads
pub trait ExecutorThreadManager: Send + Sync {
    /// Hand a fully merged round's workload to the next executor thread
    fn signal_execution_threads(&self, workload: OrderedWorkload);

    /// Stage currently granted on `key`
    fn get_current_lock_holder_for(&self, key: &RecordKey) -> Option<Arc<LockStage>>;

    /// Release every lock held by a finished action, advancing drained queues
    fn finalize_action(&self, action: &ActionRef) -> SchedulerResult<()>;
}

/// Scheduling-system operations used by scheduler threads
pub trait SchedulerThreadManager: Send + Sync {
    /// Next sealed batch; `None` once the system is stopping
    fn request_input(&self, scheduler_id: usize) -> Option<SchedulerThreadBatch>;

    /// Merge a scheduled batch and record its workload
    fn hand_batch_to_execution(
        &self,
        scheduler_id: usize,
        batch_id: u64,
        workload: OrderedWorkload,
        lock_table: BatchLockTable,
    ) -> SchedulerResult<()>;
}
