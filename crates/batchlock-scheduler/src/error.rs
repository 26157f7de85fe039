//! Error types for the scheduler

use batchlock_types::{ActionId, RecordKey, TypesError};
use thiserror::Error;

/// Scheduler errors
///
/// Every variant except `InvalidConfig` reports a broken invariant of the
/// locking pipeline; callers are expected to stop rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Action read and write sets overlap
    #[error(transparent)]
    InvalidAction(#[from] TypesError),

    /// Scheduling a batch did not fill every workload slot
    #[error("batch {batch_id}: workload has {filled} of {expected} slots filled")]
    WorkloadSizeMismatch {
        /// Batch being scheduled
        batch_id: u64,
        /// Number of actions in the batch
        expected: usize,
        /// Number of slots actually filled
        filled: usize,
    },

    /// No lock stage is queued for a record that should be held
    #[error("no lock holder for {0}")]
    NoLockHolder(RecordKey),

    /// The granted stage for a record does not contain the action
    #[error("{action} is not a member of the granted stage for {key}")]
    ActionNotInStage {
        /// Action being finalized
        action: ActionId,
        /// Record whose head stage was checked
        key: RecordKey,
    },

    /// The head stage was asked to pass its lock while still held
    #[error("head stage for {key} still has {holders} holders")]
    StageNotDrained {
        /// Record whose queue was advanced
        key: RecordKey,
        /// Outstanding holders
        holders: u64,
    },

    /// More releases than holders on a lock stage
    #[error("lock stage released more times than it was held")]
    HolderUnderflow,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::WorkloadSizeMismatch {
            batch_id: 4,
            expected: 10,
            filled: 9,
        };
        assert!(err.to_string().contains("batch 4"));

        let err = SchedulerError::NoLockHolder(RecordKey::new(12));
        assert!(err.to_string().contains("record#12"));

        let err = SchedulerError::StageNotDrained {
            key: RecordKey::new(1),
            holders: 2,
        };
        assert!(err.to_string().contains("2 holders"));
    }

    #[test]
    fn test_from_types_error() {
        let err: SchedulerError = TypesError::OverlappingAccess {
            action: ActionId::new(1),
            key: RecordKey::new(2),
        }
        .into();
        assert!(matches!(err, SchedulerError::InvalidAction(_)));
        assert!(err.to_string().contains("both reads and writes"));
    }
}
