//! Error types for action validation

use crate::key::{ActionId, RecordKey};
use thiserror::Error;

/// Action validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// A key appears in both the read set and the write set
    #[error("{action} both reads and writes {key}")]
    OverlappingAccess {
        /// Offending action
        action: ActionId,
        /// Key present in both sets
        key: RecordKey,
    },
}

/// Result type for validation
pub type TypesResult<T> = Result<T, TypesError>;
