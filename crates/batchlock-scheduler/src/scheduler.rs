//! Scheduler threads
//!
//! One `Scheduler` per scheduling thread. It pulls sealed batches from the
//! scheduling system, packs each into conflict-free rounds and turns the
//! packing order into a workload plus a batch-local lock table.

use crate::cursor::BatchCursor;
use crate::error::{SchedulerError, SchedulerResult};
use crate::lock_table::BatchLockTable;
use crate::packer::Packer;
use crate::traits::{OrderedWorkload, SchedulerThreadBatch, SchedulerThreadManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A scheduling thread's state
#[derive(Debug)]
pub struct Scheduler {
    id: usize,
    packer: Mutex<Packer>,
    stop: AtomicBool,
    batches_scheduled: AtomicU64,
}

impl Scheduler {
    /// Create scheduler number `id`
    pub fn new(id: usize) -> Self {
        Self {
            id,
            packer: Mutex::new(Packer::new()),
            stop: AtomicBool::new(false),
            batches_scheduled: AtomicU64::new(0),
        }
    }

    /// Scheduler number
    pub fn id(&self) -> usize {
        self.id
    }

    /// Ask the poll loop to exit after its current iteration
    pub fn signal_stop_working(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of batches this scheduler has processed
    pub fn batches_scheduled(&self) -> u64 {
        self.batches_scheduled.load(Ordering::Relaxed)
    }

    /// Schedule one batch.
    ///
    /// Packs until every action is placed. Each packed action takes the next
    /// workload slot and has its lock requests queued in the returned table,
    /// so per-record request order follows packing rounds.
    pub fn process_batch(
        &self,
        batch: SchedulerThreadBatch,
    ) -> SchedulerResult<(OrderedWorkload, BatchLockTable)> {
        let SchedulerThreadBatch { batch_id, batch } = batch;
        let expected = batch.len();

        let mut workload = OrderedWorkload::with_capacity(expected);
        let mut lock_table = BatchLockTable::new();
        let mut cursor = BatchCursor::new(batch);
        let mut packer = self.packer.lock();
        let mut rounds = 0usize;

        while !cursor.is_empty() {
            let packing = packer.get_packing(&mut cursor);
            cursor.compact();
            rounds += 1;

            for action in packing {
                lock_table.insert_lock_request(&action)?;
                workload.push(action);
            }
        }

        if workload.len() != expected {
            return Err(SchedulerError::WorkloadSizeMismatch {
                batch_id,
                expected,
                filled: workload.len(),
            });
        }

        self.batches_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            scheduler = self.id,
            batch_id,
            actions = expected,
            rounds,
            records = lock_table.len(),
            "batch scheduled"
        );
        Ok((workload, lock_table))
    }

    /// Poll loop: request, schedule and hand off batches until stopped.
    ///
    /// A scheduling error is fatal for this thread.
    pub fn run(&self, manager: &dyn SchedulerThreadManager) {
        tracing::info!(scheduler = self.id, "scheduler thread started");

        while !self.is_stop_requested() {
            let Some(batch) = manager.request_input(self.id) else {
                break;
            };
            let batch_id = batch.batch_id;

            let result = self.process_batch(batch).and_then(|(workload, lock_table)| {
                manager.hand_batch_to_execution(self.id, batch_id, workload, lock_table)
            });
            if let Err(e) = result {
                tracing::error!(scheduler = self.id, batch_id, error = %e, "scheduling failed");
                break;
            }
        }

        tracing::info!(
            scheduler = self.id,
            batches = self.batches_scheduled(),
            "scheduler thread stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlock_types::{Action, ActionRef, ActionState, LockType, RecordKey};
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn action(id: u64, reads: &[u64], writes: &[u64]) -> ActionRef {
        Action::new(id)
            .with_reads(reads.iter().copied())
            .with_writes(writes.iter().copied())
            .into_ref()
    }

    fn ids(workload: &[ActionRef]) -> Vec<u64> {
        workload.iter().map(|a| a.id().as_u64()).collect()
    }

    fn batch(batch_id: u64, actions: Vec<ActionRef>) -> SchedulerThreadBatch {
        SchedulerThreadBatch {
            batch_id,
            batch: actions,
        }
    }

    // ==================== process_batch ====================

    #[test]
    fn test_conflicting_writers_land_in_order() {
        let a = action(1, &[], &[1]);
        let b = action(2, &[], &[1]);
        let scheduler = Scheduler::new(0);

        let (workload, blt) = scheduler
            .process_batch(batch(0, vec![Arc::clone(&a), Arc::clone(&b)]))
            .unwrap();

        assert_eq!(ids(&workload), vec![1, 2]);
        let stages: Vec<_> = blt.queue(&RecordKey::new(1)).unwrap().stages().collect();
        assert_eq!(stages.len(), 2);
        assert!(stages[0].contains(&a));
        assert!(stages[1].contains(&b));
        assert_eq!(a.state(), ActionState::AwaitingLock);
    }

    #[test]
    fn test_workload_follows_packing_order() {
        // 1 conflicts with 0 and is pushed behind the independent 2
        let scheduler = Scheduler::new(0);
        let (workload, _) = scheduler
            .process_batch(batch(
                3,
                vec![
                    action(0, &[], &[1]),
                    action(1, &[1], &[]),
                    action(2, &[], &[2]),
                ],
            ))
            .unwrap();
        assert_eq!(ids(&workload), vec![0, 2, 1]);
        assert_eq!(scheduler.batches_scheduled(), 1);
    }

    #[test]
    fn test_readers_after_writer_share_a_stage() {
        let scheduler = Scheduler::new(0);
        let (_, blt) = scheduler
            .process_batch(batch(
                0,
                vec![
                    action(0, &[], &[5]),
                    action(1, &[5], &[]),
                    action(2, &[5], &[]),
                ],
            ))
            .unwrap();

        let stages: Vec<_> = blt.queue(&RecordKey::new(5)).unwrap().stages().collect();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].lock_type(), LockType::Exclusive);
        assert_eq!(stages[1].lock_type(), LockType::Shared);
        assert_eq!(stages[1].len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let scheduler = Scheduler::new(0);
        let (workload, blt) = scheduler.process_batch(batch(0, Vec::new())).unwrap();
        assert!(workload.is_empty());
        assert!(blt.is_empty());
    }

    #[test]
    fn test_overlapping_action_rejected() {
        let scheduler = Scheduler::new(0);
        let result = scheduler.process_batch(batch(0, vec![action(0, &[1], &[1])]));
        assert!(matches!(result, Err(SchedulerError::InvalidAction(_))));
    }

    // ==================== run ====================

    struct ScriptedManager {
        input: Mutex<VecDeque<SchedulerThreadBatch>>,
        handed: Mutex<Vec<(u64, Vec<u64>)>>,
    }

    impl SchedulerThreadManager for ScriptedManager {
        fn request_input(&self, _scheduler_id: usize) -> Option<SchedulerThreadBatch> {
            self.input.lock().pop_front()
        }

        fn hand_batch_to_execution(
            &self,
            _scheduler_id: usize,
            batch_id: u64,
            workload: OrderedWorkload,
            _lock_table: BatchLockTable,
        ) -> SchedulerResult<()> {
            self.handed.lock().push((batch_id, ids(&workload)));
            Ok(())
        }
    }

    #[test]
    fn test_run_drains_input_until_none() {
        let manager = ScriptedManager {
            input: Mutex::new(VecDeque::from(vec![
                batch(0, vec![action(0, &[], &[1])]),
                batch(1, vec![action(1, &[], &[1])]),
            ])),
            handed: Mutex::new(Vec::new()),
        };

        let scheduler = Scheduler::new(4);
        scheduler.run(&manager);

        assert_eq!(
            *manager.handed.lock(),
            vec![(0, vec![0]), (1, vec![1])]
        );
        assert_eq!(scheduler.batches_scheduled(), 2);
    }

    #[test]
    fn test_run_stops_on_error() {
        let manager = ScriptedManager {
            input: Mutex::new(VecDeque::from(vec![
                batch(0, vec![action(0, &[2], &[2])]),
                batch(1, vec![action(1, &[], &[1])]),
            ])),
            handed: Mutex::new(Vec::new()),
        };

        Scheduler::new(0).run(&manager);
        assert!(manager.handed.lock().is_empty());
        assert_eq!(manager.input.lock().len(), 1);
    }

    #[test]
    fn test_stop_flag_checked_before_polling() {
        let manager = ScriptedManager {
            input: Mutex::new(VecDeque::from(vec![batch(0, Vec::new())])),
            handed: Mutex::new(Vec::new()),
        };

        let scheduler = Scheduler::new(0);
        scheduler.signal_stop_working();
        scheduler.run(&manager);
        assert_eq!(manager.input.lock().len(), 1);
    }
}
