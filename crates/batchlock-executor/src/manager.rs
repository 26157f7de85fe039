//! Executor pool manager
//!
//! `ExecutorManager` is one handle over shared pool state, exposed through
//! two traits: `ExecutingSystem` for the supervisor driving the pool, and
//! `ExecutorThreadManager` for scheduler and executor threads.
//!
//! Rounds are dispatched to executors round-robin through
//! `next_signaled_executor`; finished actions are drained round-robin through
//! `next_output_executor`.

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::executor_thread::ExecutorThread;
use batchlock_scheduler::{
    ExecutorThreadManager, LockStage, LockTable, OrderedWorkload, SchedulerError, SchedulerResult,
};
use batchlock_types::{ActionRef, BatchAction, RecordKey};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Supervisor-facing pool operations
pub trait ExecutingSystem: Send + Sync {
    /// Spawn the executor threads; they idle until `start_working`
    fn init_threads(&self) -> ExecutorResult<()>;

    /// Let the executor threads run, spawning them first if needed
    fn start_working(&self) -> ExecutorResult<()>;

    /// Block until some executor has finished actions and return them.
    ///
    /// Returns an empty batch only once the pool is stopped.
    fn get_done_batch(&self) -> Vec<ActionRef>;

    /// Finished actions of the next executor that has any, or an empty batch
    fn try_get_done_batch(&self) -> Vec<ActionRef>;

    /// Stop every executor thread and join it
    fn stop_working(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Initialized,
    Running,
    Stopped,
}

struct ExecutorShared {
    lock_table: Arc<LockTable>,
    executors: Vec<Arc<ExecutorThread>>,
    next_signaled_executor: AtomicUsize,
    next_output_executor: AtomicUsize,
    state: Mutex<PoolState>,
    state_changed: Condvar,
    done_lock: Mutex<()>,
    done_ready: Condvar,
    stop: AtomicBool,
}

impl ExecutorShared {
    /// Park until the pool runs; false if it was stopped first
    fn wait_until_running(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            match *state {
                PoolState::Running => return true,
                PoolState::Stopped => return false,
                PoolState::Idle | PoolState::Initialized => self.state_changed.wait(&mut state),
            }
        }
    }

    fn notify_done(&self) {
        let _guard = self.done_lock.lock();
        self.done_ready.notify_all();
    }

    fn try_get_done_batch(&self) -> Vec<ActionRef> {
        let count = self.executors.len();
        let start = self.next_output_executor.fetch_add(1, Ordering::Relaxed) % count;
        for offset in 0..count {
            let batch = self.executors[(start + offset) % count].take_done();
            if !batch.is_empty() {
                return batch;
            }
        }
        Vec::new()
    }
}

impl ExecutorThreadManager for ExecutorShared {
    fn signal_execution_threads(&self, workload: OrderedWorkload) {
        if workload.is_empty() {
            return;
        }
        let index =
            self.next_signaled_executor.fetch_add(1, Ordering::Relaxed) % self.executors.len();
        tracing::debug!(executor = index, actions = workload.len(), "round dispatched");
        self.executors[index].add_actions(workload);
    }

    fn get_current_lock_holder_for(&self, key: &RecordKey) -> Option<Arc<LockStage>> {
        self.lock_table.get_head_for_record(key)
    }

    fn finalize_action(&self, action: &ActionRef) -> SchedulerResult<()> {
        for key in action.read_set().iter().chain(action.write_set()) {
            let stage = self
                .lock_table
                .get_head_for_record(key)
                .ok_or(SchedulerError::NoLockHolder(*key))?;
            if !stage.contains(action) {
                return Err(SchedulerError::ActionNotInStage {
                    action: action.id(),
                    key: *key,
                });
            }
            if stage.finalize_action(action)? {
                self.lock_table.pass_lock_to_next_stage_for(key)?;
            }
        }
        action.lifecycle().finish();
        Ok(())
    }
}

/// Executor pool over the global lock table
pub struct ExecutorManager {
    config: ExecutorConfig,
    shared: Arc<ExecutorShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorManager {
    /// Create a pool releasing locks in `lock_table`
    pub fn new(config: ExecutorConfig, lock_table: Arc<LockTable>) -> ExecutorResult<Self> {
        config.validate()?;

        let idle_wait = config.idle_wait();
        let executors = (0..config.threads)
            .map(|id| Arc::new(ExecutorThread::new(id, config.cpu_for(id), idle_wait)))
            .collect();

        Ok(Self {
            shared: Arc::new(ExecutorShared {
                lock_table,
                executors,
                next_signaled_executor: AtomicUsize::new(0),
                next_output_executor: AtomicUsize::new(0),
                state: Mutex::new(PoolState::Idle),
                state_changed: Condvar::new(),
                done_lock: Mutex::new(()),
                done_ready: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            handles: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Pool configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executor thread states, by index
    pub fn executors(&self) -> &[Arc<ExecutorThread>] {
        &self.shared.executors
    }

    /// Actions run by all executors so far
    pub fn executed(&self) -> u64 {
        self.shared.executors.iter().map(|e| e.executed()).sum()
    }

    fn spawn_threads(&self, handles: &mut Vec<JoinHandle<()>>) -> ExecutorResult<()> {
        for executor in &self.shared.executors {
            let executor = Arc::clone(executor);
            let shared = Arc::clone(&self.shared);
            let name = match executor.cpu() {
                Some(cpu) => format!("batchlock-executor-{}-cpu{}", executor.id(), cpu),
                None => format!("batchlock-executor-{}", executor.id()),
            };

            let handle = thread::Builder::new().name(name).spawn(move || {
                if !shared.wait_until_running() {
                    return;
                }
                let notify = || shared.notify_done();
                if let Err(e) = executor.run(shared.as_ref(), &notify) {
                    tracing::error!(executor = executor.id(), error = %e, "executor failed");
                }
            })?;
            handles.push(handle);
        }
        Ok(())
    }
}

impl ExecutingSystem for ExecutorManager {
    fn init_threads(&self) -> ExecutorResult<()> {
        let mut state = self.shared.state.lock();
        match *state {
            PoolState::Idle => {
                self.spawn_threads(&mut self.handles.lock())?;
                *state = PoolState::Initialized;
                tracing::info!(threads = self.config.threads, "executor threads initialized");
                Ok(())
            }
            PoolState::Initialized => Ok(()),
            PoolState::Running | PoolState::Stopped => Err(ExecutorError::AlreadyStarted),
        }
    }

    fn start_working(&self) -> ExecutorResult<()> {
        self.init_threads()?;

        let mut state = self.shared.state.lock();
        if *state != PoolState::Initialized {
            return Err(ExecutorError::AlreadyStarted);
        }
        *state = PoolState::Running;
        self.shared.state_changed.notify_all();
        tracing::info!(threads = self.config.threads, "executor pool started");
        Ok(())
    }

    fn get_done_batch(&self) -> Vec<ActionRef> {
        let mut guard = self.shared.done_lock.lock();
        loop {
            let batch = self.shared.try_get_done_batch();
            if !batch.is_empty() || self.shared.stop.load(Ordering::Acquire) {
                return batch;
            }
            self.shared.done_ready.wait(&mut guard);
        }
    }

    fn try_get_done_batch(&self) -> Vec<ActionRef> {
        self.shared.try_get_done_batch()
    }

    fn stop_working(&self) {
        self.shared.stop.store(true, Ordering::Release);
        {
            let mut state = self.shared.state.lock();
            *state = PoolState::Stopped;
            self.shared.state_changed.notify_all();
        }
        for executor in &self.shared.executors {
            executor.signal_stop_working();
        }
        self.shared.notify_done();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("executor thread panicked");
            }
        }
        tracing::info!(executed = self.executed(), "executor pool stopped");
    }
}

impl ExecutorThreadManager for ExecutorManager {
    fn signal_execution_threads(&self, workload: OrderedWorkload) {
        self.shared.signal_execution_threads(workload);
    }

    fn get_current_lock_holder_for(&self, key: &RecordKey) -> Option<Arc<LockStage>> {
        self.shared.get_current_lock_holder_for(key)
    }

    fn finalize_action(&self, action: &ActionRef) -> SchedulerResult<()> {
        self.shared.finalize_action(action)
    }
}
