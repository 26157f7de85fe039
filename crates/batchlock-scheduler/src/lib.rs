//! # batchlock-scheduler
//!
//! Deterministic batch scheduling for the batch-locking pipeline.
//!
//! Actions are admitted into fixed-size batches. Scheduler threads pack each
//! batch into conflict-free rounds, translate the packing order into per-record
//! lock stages and merge them into the global `LockTable`. Executors are
//! signaled only once every scheduler thread has merged its batch for the
//! current round.
//!
//! Features:
//! - Greedy packing of non-conflicting actions
//! - Per-record lock stage queues (batch-local and global)
//! - Round barrier across scheduler threads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod lock_queue;
pub mod lock_stage;
pub mod lock_table;
pub mod manager;
pub mod packer;
pub mod scheduler;
pub mod traits;

pub use config::{LockTableConfig, SchedulingConfig};
pub use cursor::BatchCursor;
pub use error::{SchedulerError, SchedulerResult};
pub use lock_queue::{BatchLockQueue, LockQueue};
pub use lock_stage::LockStage;
pub use lock_table::{BatchLockTable, LockTable};
pub use manager::SchedulerManager;
pub use packer::Packer;
pub use scheduler::Scheduler;
pub use traits::{ExecutorThreadManager, OrderedWorkload, SchedulerThreadBatch, SchedulerThreadManager};
