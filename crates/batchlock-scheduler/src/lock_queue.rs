//! Per-record FIFO queues of lock stages

use crate::error::{SchedulerError, SchedulerResult};
use crate::lock_stage::LockStage;
use batchlock_types::{ActionRef, LockType, RecordKey};
use std::collections::VecDeque;
use std::sync::Arc;

/// Batch-local queue for one record
///
/// Built by a single scheduler thread, so stages are owned directly.
#[derive(Debug, Clone, Default)]
pub struct BatchLockQueue {
    stages: VecDeque<LockStage>,
}

impl BatchLockQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request, joining the trailing stage when compatible
    pub fn push_request(&mut self, action: ActionRef, lock_type: LockType) {
        if let Some(last) = self.stages.back_mut() {
            if last.add_to_stage(Arc::clone(&action), lock_type) {
                return;
            }
        }
        self.stages
            .push_back(LockStage::with_requester(action, lock_type));
    }

    /// Stages in request order
    pub fn stages(&self) -> impl Iterator<Item = &LockStage> {
        self.stages.iter()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the queue has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn into_stages(self) -> VecDeque<LockStage> {
        self.stages
    }
}

/// Global queue for one record
///
/// Invariant: when non-empty, the head stage is granted and it is the only
/// granted stage.
#[derive(Debug, Default)]
pub struct LockQueue {
    stages: VecDeque<Arc<LockStage>>,
}

impl LockQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage currently holding the lock
    pub fn head(&self) -> Option<Arc<LockStage>> {
        self.stages.front().cloned()
    }

    /// Append a batch-local queue to the tail.
    ///
    /// A leading shared local stage is folded into a trailing shared stage
    /// that has not been granted yet. If the queue was idle, its new head is
    /// granted. Returns true in that case.
    pub fn merge(&mut self, local: BatchLockQueue) -> bool {
        let was_idle = self.stages.is_empty();
        let mut incoming = local.into_stages().into_iter();

        if let Some(first) = incoming.next() {
            let leftover = match self.stages.back_mut().and_then(Arc::get_mut) {
                Some(tail) => tail.try_absorb(first).err(),
                None => Some(first),
            };
            if let Some(stage) = leftover {
                self.stages.push_back(Arc::new(stage));
            }
        }
        self.stages.extend(incoming.map(Arc::new));

        match self.stages.front() {
            Some(head) if was_idle => {
                head.notify_lock_obtained();
                true
            }
            _ => false,
        }
    }

    /// Pop the drained head and grant the next stage, if any.
    ///
    /// Returns the newly granted stage, or `None` if the queue went idle.
    pub fn pass_to_next(&mut self, key: RecordKey) -> SchedulerResult<Option<Arc<LockStage>>> {
        let head = self
            .stages
            .front()
            .ok_or(SchedulerError::NoLockHolder(key))?;
        let holders = head.holders();
        if !head.has_lock() || holders != 0 {
            return Err(SchedulerError::StageNotDrained { key, holders });
        }
        self.stages.pop_front();

        Ok(self.stages.front().map(|next| {
            next.notify_lock_obtained();
            Arc::clone(next)
        }))
    }

    /// Stages in grant order
    pub fn stages(&self) -> impl Iterator<Item = &Arc<LockStage>> {
        self.stages.iter()
    }

    /// Number of queued stages, head included
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether nobody holds or waits for the record
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
