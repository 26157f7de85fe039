//! A single executor worker
//!
//! The worker keeps the actions it was handed in workload order and
//! repeatedly runs every one that became ready. An action is ready once each
//! of its lock stages was granted; before running it the worker re-checks
//! that every record's granted stage really contains the action.

use crate::error::{ExecutorError, ExecutorResult};
use batchlock_scheduler::{ExecutorThreadManager, OrderedWorkload};
use batchlock_types::{ActionRef, BatchAction};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// State shared between an executor thread and its manager
#[derive(Debug)]
pub struct ExecutorThread {
    id: usize,
    cpu: Option<usize>,
    idle_wait: Duration,
    incoming: Mutex<Vec<ActionRef>>,
    work_ready: Condvar,
    done: Mutex<Vec<ActionRef>>,
    stop: AtomicBool,
    executed: AtomicU64,
}

impl ExecutorThread {
    /// Create executor number `id`
    pub fn new(id: usize, cpu: Option<usize>, idle_wait: Duration) -> Self {
        Self {
            id,
            cpu,
            idle_wait,
            incoming: Mutex::new(Vec::new()),
            work_ready: Condvar::new(),
            done: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
            executed: AtomicU64::new(0),
        }
    }

    /// Executor number
    pub fn id(&self) -> usize {
        self.id
    }

    /// Preferred CPU, if configured
    pub fn cpu(&self) -> Option<usize> {
        self.cpu
    }

    /// Queue a workload behind the actions already handed to this executor
    pub fn add_actions(&self, workload: OrderedWorkload) {
        let mut incoming = self.incoming.lock();
        incoming.extend(workload);
        self.work_ready.notify_one();
    }

    /// Take every action finished since the last call
    pub fn take_done(&self) -> Vec<ActionRef> {
        std::mem::take(&mut *self.done.lock())
    }

    /// Whether finished actions are waiting to be collected
    pub fn has_done(&self) -> bool {
        !self.done.lock().is_empty()
    }

    /// Number of actions run so far
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Ask the poll loop to exit after its current iteration
    pub fn signal_stop_working(&self) {
        self.stop.store(true, Ordering::Release);
        let _incoming = self.incoming.lock();
        self.work_ready.notify_all();
    }

    /// Whether a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Poll loop: run ready actions until stopped.
    ///
    /// `on_done` is called after each finished action is published. A broken
    /// lock invariant ends the loop with an error.
    pub fn run(
        &self,
        manager: &dyn ExecutorThreadManager,
        on_done: &dyn Fn(),
    ) -> ExecutorResult<()> {
        tracing::info!(executor = self.id, cpu = ?self.cpu, "executor thread started");
        let mut pending: Vec<ActionRef> = Vec::new();

        while !self.is_stop_requested() {
            {
                let mut incoming = self.incoming.lock();
                if incoming.is_empty() && pending.is_empty() {
                    self.work_ready.wait_for(&mut incoming, self.idle_wait);
                }
                pending.append(&mut incoming);
            }

            let (ready, waiting): (Vec<ActionRef>, Vec<ActionRef>) =
                pending.drain(..).partition(|action| action.is_ready());
            pending = waiting;

            if ready.is_empty() {
                if !pending.is_empty() {
                    let mut incoming = self.incoming.lock();
                    if incoming.is_empty() {
                        self.work_ready.wait_for(&mut incoming, self.idle_wait);
                    }
                }
                continue;
            }

            for action in ready {
                self.execute(manager, action)?;
                on_done();
            }
        }

        tracing::info!(
            executor = self.id,
            executed = self.executed(),
            abandoned = pending.len(),
            "executor thread stopped"
        );
        Ok(())
    }

    fn execute(&self, manager: &dyn ExecutorThreadManager, action: ActionRef) -> ExecutorResult<()> {
        self.verify_locks(manager, &action)?;
        if !action.lifecycle().begin_execution() {
            tracing::warn!(executor = self.id, action = %action.id(), "action already claimed");
            return Ok(());
        }

        action.run();
        manager.finalize_action(&action)?;

        self.executed.fetch_add(1, Ordering::Relaxed);
        self.push_done(action);
        Ok(())
    }

    pub(crate) fn push_done(&self, action: ActionRef) {
        self.done.lock().push(action);
    }

    fn verify_locks(&self, manager: &dyn ExecutorThreadManager, action: &ActionRef) -> ExecutorResult<()> {
        for key in action.read_set().iter().chain(action.write_set()) {
            let held = manager
                .get_current_lock_holder_for(key)
                .map(|stage| stage.has_lock() && stage.contains(action))
                .unwrap_or(false);
            if !held {
                return Err(ExecutorError::LockNotHeld {
                    action: action.id(),
                    key: *key,
                });
            }
        }
        Ok(())
    }
}
