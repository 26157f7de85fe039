//! Engine supervisor

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use batchlock_executor::{ExecutingSystem, ExecutorManager};
use batchlock_scheduler::{ExecutorThreadManager, LockTable, SchedulerManager};
use batchlock_types::ActionRef;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// One lock table, one scheduling system and one executor pool
pub struct BatchEngine {
    config: EngineConfig,
    lock_table: Arc<LockTable>,
    executors: Arc<ExecutorManager>,
    schedulers: Arc<SchedulerManager>,
    state: AtomicU8,
    submitted: AtomicU64,
}

impl BatchEngine {
    /// Build an engine; no thread is started yet
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let lock_table = Arc::new(LockTable::with_config(&config.lock_table));
        let executors = Arc::new(ExecutorManager::new(
            config.executor.clone(),
            Arc::clone(&lock_table),
        )?);
        let schedulers = Arc::new(SchedulerManager::new(
            config.scheduling.clone(),
            Arc::clone(&lock_table),
            Arc::clone(&executors) as Arc<dyn ExecutorThreadManager>,
        )?);

        Ok(Self {
            config,
            lock_table,
            executors,
            schedulers,
            state: AtomicU8::new(CREATED),
            submitted: AtomicU64::new(0),
        })
    }

    /// Start the executor pool, then the scheduler threads
    pub fn start(&self) -> EngineResult<()> {
        if self
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::InvalidState("engine already started"));
        }

        self.executors.start_working()?;
        self.schedulers.start_working()?;
        tracing::info!(
            scheduler_threads = self.config.scheduling.scheduler_threads,
            executor_threads = self.config.executor.threads,
            batch_size = self.config.scheduling.batch_size,
            "batch engine started"
        );
        Ok(())
    }

    /// Admit one action
    pub fn submit(&self, action: ActionRef) -> EngineResult<()> {
        self.schedulers.add_action(action)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Admit actions in order, stopping at the first rejected one
    pub fn submit_all<I>(&self, actions: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = ActionRef>,
    {
        let mut count = 0;
        for action in actions {
            self.submit(action)?;
            count += 1;
        }
        Ok(count)
    }

    /// Ship the partially filled batch and complete the current round
    pub fn flush(&self) {
        self.schedulers.flush();
    }

    /// Block until some finished actions are available
    ///
    /// Empty only once the engine is stopped.
    pub fn get_done_batch(&self) -> Vec<ActionRef> {
        self.executors.get_done_batch()
    }

    /// Finished actions if any are available
    pub fn try_get_done_batch(&self) -> Vec<ActionRef> {
        self.executors.try_get_done_batch()
    }

    /// Stop admission, then the executors; joins every thread
    pub fn stop(&self) {
        if self.state.swap(STOPPED, Ordering::AcqRel) != RUNNING {
            return;
        }
        self.schedulers.stop();
        self.executors.stop_working();
        tracing::info!(
            submitted = self.submitted(),
            executed = self.executed(),
            rounds = self.schedulers.rounds_signaled(),
            "batch engine stopped"
        );
    }

    /// Whether `start` succeeded and `stop` has not been called
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Global lock table
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }

    /// Actions admitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Actions run so far
    pub fn executed(&self) -> u64 {
        self.executors.executed()
    }

    /// Rounds released to the executors so far
    pub fn rounds_signaled(&self) -> u64 {
        self.schedulers.rounds_signaled()
    }
}

impl Drop for BatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlock_executor::ExecutorConfig;
    use batchlock_scheduler::SchedulingConfig;
    use batchlock_types::{Action, ActionState};

    fn small_config() -> EngineConfig {
        EngineConfig {
            scheduling: SchedulingConfig::new(2, 4),
            executor: ExecutorConfig::with_threads(2),
            ..EngineConfig::default()
        }
    }

    fn drain(engine: &BatchEngine, expected: usize) -> Vec<ActionRef> {
        let mut done = Vec::new();
        while done.len() < expected {
            let batch = engine.get_done_batch();
            if batch.is_empty() {
                break;
            }
            done.extend(batch);
        }
        done
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config();
        config.executor.threads = 0;
        assert!(matches!(
            BatchEngine::new(config),
            Err(EngineError::Executor(_))
        ));
    }

    #[test]
    fn test_start_twice_rejected() {
        let engine = BatchEngine::new(small_config()).unwrap();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::InvalidState(_))));
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_submit_rejects_overlapping_action() {
        let engine = BatchEngine::new(small_config()).unwrap();
        let bad = Action::new(1u64).with_reads([1u64]).with_writes([1u64]).into_ref();
        assert!(matches!(engine.submit(bad), Err(EngineError::Scheduler(_))));
        assert_eq!(engine.submitted(), 0);
    }

    #[test]
    fn test_hot_key_pipeline() {
        let engine = BatchEngine::new(small_config()).unwrap();
        engine.start().unwrap();

        let actions: Vec<ActionRef> = (0..10u64)
            .map(|i| Action::new(i).with_writes([0u64]).into_ref())
            .collect();
        assert_eq!(engine.submit_all(actions.clone()).unwrap(), 10);
        engine.flush();

        let done = drain(&engine, 10);
        engine.stop();

        assert_eq!(done.len(), 10);
        assert_eq!(engine.executed(), 10);
        assert!(engine.lock_table().is_idle());
        assert!(actions.iter().all(|a| a.state() == ActionState::Done));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let engine = BatchEngine::new(small_config()).unwrap();
        engine.stop();
        assert_eq!(engine.rounds_signaled(), 0);
    }
}
