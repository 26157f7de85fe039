//! Configuration for scheduling and the global lock table

use crate::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of scheduler threads
pub const DEFAULT_SCHEDULER_THREADS: usize = 2;

/// Default number of actions per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of records the lock table is sized for
pub const DEFAULT_EXPECTED_RECORDS: usize = 1 << 16;

/// Scheduling system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Number of scheduler threads; also the number of batches per round
    pub scheduler_threads: usize,
    /// Actions per batch
    pub batch_size: usize,
    /// Seal a short batch once it has been open this long (milliseconds)
    pub batch_timeout_ms: Option<u64>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: DEFAULT_SCHEDULER_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout_ms: None,
        }
    }
}

impl SchedulingConfig {
    /// Create a config with the given thread count and batch size
    pub fn new(scheduler_threads: usize, batch_size: usize) -> Self {
        Self {
            scheduler_threads,
            batch_size,
            batch_timeout_ms: None,
        }
    }

    /// Batch time-box, if any
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }

    /// Check the config for values the pipeline cannot run with
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.scheduler_threads == 0 {
            return Err(SchedulerError::InvalidConfig(
                "scheduler_threads must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.batch_timeout_ms == Some(0) {
            return Err(SchedulerError::InvalidConfig(
                "batch_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global lock table sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockTableConfig {
    /// Number of distinct records expected; used to pre-size the table
    pub expected_records: usize,
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            expected_records: DEFAULT_EXPECTED_RECORDS,
        }
    }
}
