//! The action abstraction consumed by the locking pipeline
//!
//! An action is known to the pipeline only through its read set, its write
//! set and a notification sink for granted locks. Everything an action does
//! once it runs is opaque.

use crate::error::{TypesError, TypesResult};
use crate::key::{ActionId, RecordKey, RecordKeySet};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle of an action inside the pipeline
///
/// States only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ActionState {
    /// Built, not yet scheduled
    Assembled = 0,
    /// Lock requests installed, waiting for grants
    AwaitingLock = 1,
    /// Every requested lock is granted
    ReadyToExecute = 2,
    /// Claimed by an executor thread
    Executing = 3,
    /// Finished and its locks released
    Done = 4,
}

impl ActionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActionState::Assembled,
            1 => ActionState::AwaitingLock,
            2 => ActionState::ReadyToExecute,
            3 => ActionState::Executing,
            _ => ActionState::Done,
        }
    }
}

/// Atomic lifecycle state plus the number of lock grants received
#[derive(Debug, Default)]
pub struct ActionLifecycle {
    state: AtomicU8,
    granted: AtomicUsize,
}

impl ActionLifecycle {
    /// Create a lifecycle in the `Assembled` state
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ActionState::Assembled as u8),
            granted: AtomicUsize::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> ActionState {
        ActionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of lock grants received so far
    pub fn granted_locks(&self) -> usize {
        self.granted.load(Ordering::Acquire)
    }

    /// Mark the action's lock requests as installed.
    ///
    /// An action requesting no locks is immediately ready.
    pub fn await_locks(&self, lock_count: usize) {
        self.advance_to(ActionState::AwaitingLock);
        if lock_count == 0 {
            self.advance_to(ActionState::ReadyToExecute);
        }
    }

    /// Record one granted lock out of `lock_count`.
    ///
    /// Returns true if this grant made the action ready.
    pub fn grant_lock(&self, lock_count: usize) -> bool {
        let granted = self.granted.fetch_add(1, Ordering::AcqRel) + 1;
        if granted == lock_count {
            self.advance_to(ActionState::ReadyToExecute);
            return true;
        }
        false
    }

    /// Claim the action for execution.
    ///
    /// Succeeds for exactly one caller, and only once the action is ready.
    pub fn begin_execution(&self) -> bool {
        self.state
            .compare_exchange(
                ActionState::ReadyToExecute as u8,
                ActionState::Executing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the action done
    pub fn finish(&self) {
        self.advance_to(ActionState::Done);
    }

    fn advance_to(&self, state: ActionState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }
}

/// An action schedulable by the batch-locking pipeline
pub trait BatchAction: Send + Sync + fmt::Debug {
    /// Action identifier
    fn id(&self) -> ActionId;

    /// Keys read by the action (shared locks)
    fn read_set(&self) -> &RecordKeySet;

    /// Keys written by the action (exclusive locks)
    fn write_set(&self) -> &RecordKeySet;

    /// Lifecycle tracking
    fn lifecycle(&self) -> &ActionLifecycle;

    /// Run the action's own logic. Called once all its locks are granted.
    fn run(&self);

    /// Total number of locks requested
    fn lock_count(&self) -> usize {
        self.read_set().len() + self.write_set().len()
    }

    /// Notification that one of the action's lock stages was granted
    fn ready_to_execute(&self) {
        self.lifecycle().grant_lock(self.lock_count());
    }

    /// Whether every requested lock is granted and nobody claimed the action yet
    fn is_ready(&self) -> bool {
        self.lifecycle().state() == ActionState::ReadyToExecute
    }

    /// Current lifecycle state
    fn state(&self) -> ActionState {
        self.lifecycle().state()
    }

    /// Check that the read and write sets are disjoint
    fn validate(&self) -> TypesResult<()> {
        let (smaller, larger) = if self.read_set().len() <= self.write_set().len() {
            (self.read_set(), self.write_set())
        } else {
            (self.write_set(), self.read_set())
        };
        match smaller.iter().find(|key| larger.contains(key)) {
            Some(key) => Err(TypesError::OverlappingAccess {
                action: self.id(),
                key: *key,
            }),
            None => Ok(()),
        }
    }
}

/// Shared handle to an action
///
/// Held at once by a workload slot, every lock stage the action belongs to
/// and the executor running it.
pub type ActionRef = Arc<dyn BatchAction>;

type Work = Box<dyn Fn(&Action) + Send + Sync>;

/// General-purpose action with an optional body
pub struct Action {
    id: ActionId,
    reads: RecordKeySet,
    writes: RecordKeySet,
    lifecycle: ActionLifecycle,
    work: Option<Work>,
}

impl Action {
    /// Create an action with empty read and write sets
    pub fn new(id: impl Into<ActionId>) -> Self {
        Self {
            id: id.into(),
            reads: RecordKeySet::new(),
            writes: RecordKeySet::new(),
            lifecycle: ActionLifecycle::new(),
            work: None,
        }
    }

    /// Add keys to the read set
    pub fn with_reads<K, I>(mut self, keys: I) -> Self
    where
        K: Into<RecordKey>,
        I: IntoIterator<Item = K>,
    {
        self.reads.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add keys to the write set
    pub fn with_writes<K, I>(mut self, keys: I) -> Self
    where
        K: Into<RecordKey>,
        I: IntoIterator<Item = K>,
    {
        self.writes.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Attach the body run on execution
    pub fn with_work<F>(mut self, work: F) -> Self
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        self.work = Some(Box::new(work));
        self
    }

    /// Record a read access
    pub fn add_read_key(&mut self, key: impl Into<RecordKey>) {
        self.reads.insert(key.into());
    }

    /// Record a write access
    pub fn add_write_key(&mut self, key: impl Into<RecordKey>) {
        self.writes.insert(key.into());
    }

    /// Wrap into a shared handle
    pub fn into_ref(self) -> ActionRef {
        Arc::new(self)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl BatchAction for Action {
    fn id(&self) -> ActionId {
        self.id
    }

    fn read_set(&self) -> &RecordKeySet {
        &self.reads
    }

    fn write_set(&self) -> &RecordKeySet {
        &self.writes
    }

    fn lifecycle(&self) -> &ActionLifecycle {
        &self.lifecycle
    }

    fn run(&self) {
        if let Some(work) = &self.work {
            work(self);
        }
    }
}
