//! # batchlock-core
//!
//! Deterministic batch-locking engine.
//!
//! `BatchEngine` owns one global lock table, one scheduling system and one
//! executor pool:
//!
//! ```text
//! submit -> batches -> schedulers (pack, lock requests) -> merge in batch order
//!        -> round barrier -> executors -> finalize -> next lock stage granted
//! ```
//!
//! Per-record lock grant order depends only on admission order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::BatchEngine;
pub use error::{EngineError, EngineResult};

pub use batchlock_executor::{ExecutingSystem, ExecutorConfig};
pub use batchlock_scheduler::{LockTableConfig, SchedulingConfig};
pub use batchlock_types::{Action, ActionId, ActionRef, ActionState, BatchAction, RecordKey};
