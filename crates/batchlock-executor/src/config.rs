//! Executor pool configuration

use crate::error::{ExecutorError, ExecutorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of executor threads
pub const DEFAULT_EXECUTOR_THREADS: usize = 4;

/// Default idle wait between scans with nothing runnable (microseconds)
pub const DEFAULT_IDLE_WAIT_US: u64 = 200;

/// Executor pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of executor threads
    pub threads: usize,
    /// Preferred CPU per executor thread, by index
    ///
    /// Advisory: recorded in thread names and logs, threads are not pinned.
    pub cpu_affinity: Vec<usize>,
    /// How long an executor with nothing runnable waits before rescanning
    pub idle_wait_us: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_EXECUTOR_THREADS,
            cpu_affinity: Vec::new(),
            idle_wait_us: DEFAULT_IDLE_WAIT_US,
        }
    }
}

impl ExecutorConfig {
    /// Create a config with `threads` executors and default settings
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Idle wait as a duration
    pub fn idle_wait(&self) -> Duration {
        Duration::from_micros(self.idle_wait_us)
    }

    /// Preferred CPU for executor `index`, if configured
    pub fn cpu_for(&self, index: usize) -> Option<usize> {
        self.cpu_affinity.get(index).copied()
    }

    /// Check the config for values the pool cannot run with
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.threads == 0 {
            return Err(ExecutorError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.cpu_affinity.len() > self.threads {
            return Err(ExecutorError::InvalidConfig(format!(
                "cpu_affinity lists {} cpus for {} threads",
                self.cpu_affinity.len(),
                self.threads
            )));
        }
        if self.idle_wait_us == 0 {
            return Err(ExecutorError::InvalidConfig(
                "idle_wait_us must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
