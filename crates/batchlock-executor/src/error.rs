//! Error types for the executor pool

use batchlock_scheduler::SchedulerError;
use batchlock_types::{ActionId, RecordKey};
use thiserror::Error;

/// Executor errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Lock table invariant broken while releasing locks
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// An action marked ready does not hold a lock it requested
    #[error("{action} is ready but does not hold the lock on {key}")]
    LockNotHeld {
        /// Action about to run
        action: ActionId,
        /// Record whose granted stage lacks the action
        key: RecordKey,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Spawning an executor thread failed
    #[error("failed to spawn executor thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// `start_working` called on a running pool
    #[error("executor pool already started")]
    AlreadyStarted,
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExecutorError::LockNotHeld {
            action: ActionId::new(3),
            key: RecordKey::new(9),
        };
        assert_eq!(
            err.to_string(),
            "action#3 is ready but does not hold the lock on record#9"
        );
    }

    #[test]
    fn test_from_scheduler_error() {
        let err: ExecutorError = SchedulerError::HolderUnderflow.into();
        assert!(matches!(err, ExecutorError::Scheduler(_)));
    }
}
