//! # batchlock-types
//!
//! Shared types for the batch-locking pipeline.
//!
//! This crate provides:
//! - `RecordKey`: the unit of lock granularity
//! - `LockType`: shared or exclusive access
//! - `BatchAction`: the interface every schedulable action implements
//! - `Action`: a ready-made action carrying an optional closure

#![warn(missing_docs)]
#![warn(clippy::all)]

mod action;
mod error;
mod key;

pub use action::{Action, ActionLifecycle, ActionRef, ActionState, BatchAction};
pub use error::{TypesError, TypesResult};
pub use key::{ActionId, LockType, RecordKey, RecordKeySet};
