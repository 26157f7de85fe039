//! Scheduling system: batch admission, merge ordering and the round barrier
//!
//! ## Batches
//!
//! Actions are admitted into the open batch, which is sealed once it holds
//! `batch_size` actions, when it outlives `batch_timeout_ms`, or on `flush`.
//! Batch ids are assigned when a sealed batch is handed to a scheduler
//! thread, so concurrent requesters see a gapless sequence.
//!
//! ## Rounds
//!
//! With C scheduler threads, round r is batches `[r*C, (r+1)*C)`. Batch
//! tables are merged into the global lock table strictly in batch id order;
//! a hand-off that arrives early is parked until its predecessors merge.
//! Executors are signaled once per round, after the round's last merge, with
//! the round's workloads concatenated in batch id order.

use crate::config::SchedulingConfig;
use crate::error::SchedulerResult;
use crate::lock_table::{BatchLockTable, LockTable};
use crate::scheduler::Scheduler;
use crate::traits::{
    ExecutorThreadManager, OrderedWorkload, SchedulerThreadBatch, SchedulerThreadManager,
};
use batchlock_types::{ActionRef, BatchAction};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct InputState {
    open: Vec<ActionRef>,
    opened_at: Instant,
    sealed: VecDeque<Vec<ActionRef>>,
    next_batch_id: u64,
}

impl InputState {
    /// Batches sealed so far, handed out or not
    fn issued(&self) -> u64 {
        self.next_batch_id + self.sealed.len() as u64
    }

    fn seal(&mut self, batch_size: usize) {
        let batch = std::mem::replace(&mut self.open, Vec::with_capacity(batch_size));
        self.sealed.push_back(batch);
        self.opened_at = Instant::now();
    }
}

#[derive(Default)]
struct RoundState {
    next_merge_id: u64,
    pending: BTreeMap<u64, (OrderedWorkload, BatchLockTable)>,
    round_workload: OrderedWorkload,
    merged_in_round: usize,
    rounds_signaled: u64,
}

/// Admits actions, feeds scheduler threads and signals executors per round
pub struct SchedulerManager {
    config: SchedulingConfig,
    input: Mutex<InputState>,
    input_ready: Condvar,
    rounds: Mutex<RoundState>,
    lock_table: Arc<LockTable>,
    exec_manager: Arc<dyn ExecutorThreadManager>,
    stop: AtomicBool,
    schedulers: Vec<Arc<Scheduler>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerManager {
    /// Create a scheduling system feeding `lock_table` and `exec_manager`
    pub fn new(
        config: SchedulingConfig,
        lock_table: Arc<LockTable>,
        exec_manager: Arc<dyn ExecutorThreadManager>,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        let schedulers = (0..config.scheduler_threads)
            .map(|id| Arc::new(Scheduler::new(id)))
            .collect();

        Ok(Self {
            input: Mutex::new(InputState {
                open: Vec::with_capacity(config.batch_size),
                opened_at: Instant::now(),
                sealed: VecDeque::new(),
                next_batch_id: 0,
            }),
            input_ready: Condvar::new(),
            rounds: Mutex::new(RoundState::default()),
            lock_table,
            exec_manager,
            stop: AtomicBool::new(false),
            schedulers,
            handles: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Scheduling configuration
    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// Global lock table batches are merged into
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }

    /// Admit one action into the open batch.
    ///
    /// Actions whose read and write sets overlap are rejected here, before
    /// they reach a scheduler thread.
    pub fn add_action(&self, action: ActionRef) -> SchedulerResult<()> {
        action.validate()?;

        let mut input = self.input.lock();
        let opened = input.open.is_empty();
        if opened {
            input.opened_at = Instant::now();
        }
        input.open.push(action);
        if input.open.len() >= self.config.batch_size {
            input.seal(self.config.batch_size);
            tracing::debug!(issued = input.issued(), "batch sealed");
            self.input_ready.notify_one();
        } else if opened && self.config.batch_timeout().is_some() {
            // idle schedulers wait without a deadline; start the time-box
            self.input_ready.notify_one();
        }
        Ok(())
    }

    /// Seal the open batch now, padding the current round with empty batches
    /// so every admitted action reaches the executors.
    pub fn flush(&self) {
        let mut input = self.input.lock();
        let round = self.config.scheduler_threads as u64;

        if !input.open.is_empty() {
            input.seal(self.config.batch_size);
        }
        let mut padded = 0usize;
        while Self::round_open(&input, round) {
            input.seal(self.config.batch_size);
            padded += 1;
        }

        tracing::debug!(issued = input.issued(), padded, "batches flushed");
        self.input_ready.notify_all();
    }

    /// Whether executors are waiting on a round that is not fully handed out
    fn round_open(input: &InputState, round: u64) -> bool {
        input.issued() % round != 0
    }

    /// Seal the open batch if it outlived the time-box.
    ///
    /// An empty batch is only sealed while the current round is incomplete.
    fn seal_expired(&self, input: &mut InputState) {
        let Some(timeout) = self.config.batch_timeout() else {
            return;
        };
        let round = self.config.scheduler_threads as u64;
        let worth_sealing = !input.open.is_empty() || Self::round_open(input, round);
        if worth_sealing && input.opened_at.elapsed() >= timeout {
            let actions = input.open.len();
            input.seal(self.config.batch_size);
            tracing::debug!(issued = input.issued(), actions, "batch sealed on timeout");
        }
    }

    /// How long a scheduler waits for input before re-checking the time-box.
    ///
    /// `None` waits for a notification: no time-box is set, or nothing is
    /// open and the current round is complete.
    fn input_wait(&self, input: &InputState) -> Option<Duration> {
        let timeout = self.config.batch_timeout()?;
        let round = self.config.scheduler_threads as u64;
        if input.open.is_empty() && !Self::round_open(input, round) {
            return None;
        }
        let waited = input.opened_at.elapsed();
        Some(timeout.saturating_sub(waited).max(timeout / 4))
    }

    /// Spawn one thread per scheduler
    pub fn start_working(self: &Arc<Self>) -> std::io::Result<()> {
        let mut handles = self.handles.lock();
        for scheduler in &self.schedulers {
            let scheduler = Arc::clone(scheduler);
            let manager = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("batchlock-scheduler-{}", scheduler.id()))
                .spawn(move || scheduler.run(manager.as_ref()))?;
            handles.push(handle);
        }
        tracing::info!(threads = self.schedulers.len(), "scheduling system started");
        Ok(())
    }

    /// Stop admission of new batches and join the scheduler threads.
    ///
    /// Batches already being scheduled are finished first.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        for scheduler in &self.schedulers {
            scheduler.signal_stop_working();
        }
        {
            let _input = self.input.lock();
            self.input_ready.notify_all();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("scheduler thread panicked");
            }
        }
        tracing::info!(rounds = self.rounds_signaled(), "scheduling system stopped");
    }

    /// Whether `stop` was called
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of rounds released to the executors
    pub fn rounds_signaled(&self) -> u64 {
        self.rounds.lock().rounds_signaled
    }

    /// Number of batch tables merged into the lock table
    pub fn merged_batches(&self) -> u64 {
        self.rounds.lock().next_merge_id
    }

    /// Sealed batches not yet handed to a scheduler thread
    pub fn pending_batches(&self) -> usize {
        self.input.lock().sealed.len()
    }
}

impl SchedulerThreadManager for SchedulerManager {
    fn request_input(&self, scheduler_id: usize) -> Option<SchedulerThreadBatch> {
        let mut input = self.input.lock();
        loop {
            if self.is_stopped() {
                return None;
            }
            self.seal_expired(&mut input);

            if let Some(batch) = input.sealed.pop_front() {
                let batch_id = input.next_batch_id;
                input.next_batch_id += 1;
                tracing::debug!(
                    scheduler = scheduler_id,
                    batch_id,
                    actions = batch.len(),
                    "batch handed out"
                );
                return Some(SchedulerThreadBatch { batch_id, batch });
            }

            match self.input_wait(&input) {
                Some(remaining) => {
                    self.input_ready.wait_for(&mut input, remaining);
                }
                None => self.input_ready.wait(&mut input),
            }
        }
    }

    fn hand_batch_to_execution(
        &self,
        scheduler_id: usize,
        batch_id: u64,
        workload: OrderedWorkload,
        lock_table: BatchLockTable,
    ) -> SchedulerResult<()> {
        let round_size = self.config.scheduler_threads;
        let mut rounds = self.rounds.lock();
        rounds.pending.insert(batch_id, (workload, lock_table));

        loop {
            let next = rounds.next_merge_id;
            let Some((workload, lock_table)) = rounds.pending.remove(&next) else {
                break;
            };

            self.lock_table.merge_batch_table(lock_table);
            rounds.next_merge_id += 1;
            rounds.round_workload.extend(workload);
            rounds.merged_in_round += 1;

            if rounds.merged_in_round == round_size {
                let round_workload = std::mem::take(&mut rounds.round_workload);
                rounds.merged_in_round = 0;
                rounds.rounds_signaled += 1;
                tracing::debug!(
                    round = rounds.rounds_signaled - 1,
                    actions = round_workload.len(),
                    "round merged, signaling executors"
                );
                self.exec_manager.signal_execution_threads(round_workload);
            }
        }

        if !rounds.pending.is_empty() {
            tracing::trace!(
                scheduler = scheduler_id,
                batch_id,
                parked = rounds.pending.len(),
                "hand-off parked"
            );
        }
        Ok(())
    }
}
