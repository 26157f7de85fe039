//! # batchlock-executor
//!
//! Executor pool for the batch-locking pipeline.
//!
//! Each executor thread receives whole rounds of actions from the scheduling
//! system, runs an action once every lock it requested is granted, and then
//! releases those locks through `ExecutorManager::finalize_action`. Releasing
//! the last holder of a stage is the only way a record's queue advances.
//!
//! `ExecutorManager` serves two callers:
//! - the supervisor, through `ExecutingSystem` (pool lifecycle, done batches)
//! - scheduler and executor threads, through `ExecutorThreadManager`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod executor_thread;
pub mod manager;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, ExecutorResult};
pub use executor_thread::ExecutorThread;
pub use manager::{ExecutingSystem, ExecutorManager};
