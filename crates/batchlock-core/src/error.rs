//! Engine error types

use batchlock_executor::ExecutorError;
use batchlock_scheduler::SchedulerError;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Scheduling system error
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Executor pool error
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Reading a config file or spawning threads failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed config
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation not valid in the engine's current state
    #[error("invalid engine state: {0}")]
    InvalidState(&'static str),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
