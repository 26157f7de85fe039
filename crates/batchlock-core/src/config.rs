//! Engine configuration
//!
//! Loadable from JSON; every section and field falls back to its default.
//!
//! ```json
//! {
//!   "scheduling": { "scheduler_threads": 2, "batch_size": 1000, "batch_timeout_ms": 5 },
//!   "lock_table": { "expected_records": 65536 },
//!   "executor": { "threads": 4, "cpu_affinity": [0, 1, 2, 3] }
//! }
//! ```

use crate::error::EngineResult;
use batchlock_executor::ExecutorConfig;
use batchlock_scheduler::{LockTableConfig, SchedulingConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler threads and batching
    pub scheduling: SchedulingConfig,
    /// Global lock table sizing
    pub lock_table: LockTableConfig,
    /// Executor pool
    pub executor: ExecutorConfig,
}

impl EngineConfig {
    /// Parse a JSON config
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate every section
    pub fn validate(&self) -> EngineResult<()> {
        self.scheduling.validate()?;
        self.executor.validate()?;
        Ok(())
    }
}
