//! Lock stages: groups of same-mode requesters granted together
//!
//! A stage moves through three states:
//!
//! ```text
//! Requesting --notify_lock_obtained--> Holding --last finalize_action--> Drained
//! ```
//!
//! Members are only added while Requesting. Once Holding, the only field
//! touched concurrently is the holder count.

use crate::error::{SchedulerError, SchedulerResult};
use batchlock_types::{ActionRef, LockType};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One group of lock requesters for a single record
pub struct LockStage {
    requesters: Vec<ActionRef>,
    lock_type: LockType,
    holders: AtomicU64,
    granted: AtomicBool,
}

impl LockStage {
    /// Create an empty stage
    pub fn new() -> Self {
        Self {
            requesters: Vec::new(),
            lock_type: LockType::Shared,
            holders: AtomicU64::new(0),
            granted: AtomicBool::new(false),
        }
    }

    /// Create a stage with a single requester
    pub fn with_requester(action: ActionRef, lock_type: LockType) -> Self {
        Self {
            requesters: vec![action],
            lock_type,
            holders: AtomicU64::new(1),
            granted: AtomicBool::new(false),
        }
    }

    /// Try to add a requester.
    ///
    /// Succeeds on an empty stage, or when both the stage and the request are
    /// shared. Leaves the stage untouched otherwise.
    pub fn add_to_stage(&mut self, action: ActionRef, lock_type: LockType) -> bool {
        if self.requesters.is_empty() {
            self.lock_type = lock_type;
        } else if !self.lock_type.is_compatible_with(lock_type) {
            return false;
        }
        self.requesters.push(action);
        *self.holders.get_mut() += 1;
        true
    }

    /// Move all requesters of `other` to the end of this stage.
    ///
    /// Only a shared stage that has not been granted yet can absorb another
    /// shared stage. On failure `other` is handed back unchanged.
    pub fn try_absorb(&mut self, other: LockStage) -> Result<(), LockStage> {
        let compatible = !self.has_lock()
            && !self.requesters.is_empty()
            && !other.requesters.is_empty()
            && self.lock_type.is_compatible_with(other.lock_type);
        if !compatible {
            return Err(other);
        }
        *self.holders.get_mut() += other.requesters.len() as u64;
        self.requesters.extend(other.requesters);
        Ok(())
    }

    /// Grant the stage and notify every member.
    ///
    /// Repeated calls are no-ops.
    pub fn notify_lock_obtained(&self) {
        if self.granted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.holders
            .store(self.requesters.len() as u64, Ordering::Release);
        for action in &self.requesters {
            action.ready_to_execute();
        }
    }

    /// Release one holder, returning the remaining count
    pub fn decrement_holders(&self) -> SchedulerResult<u64> {
        self.holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |h| h.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| SchedulerError::HolderUnderflow)
    }

    /// Mark `action` done and release its hold.
    ///
    /// Returns true when this was the last holder, meaning the caller must
    /// pass the lock to the next stage.
    pub fn finalize_action(&self, action: &ActionRef) -> SchedulerResult<bool> {
        action.lifecycle().finish();
        Ok(self.decrement_holders()? == 0)
    }

    /// Whether the stage has been granted
    pub fn has_lock(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }

    /// Whether `action` is a member of this stage
    pub fn contains(&self, action: &ActionRef) -> bool {
        self.requesters.iter().any(|member| same_action(member, action))
    }

    /// Members in insertion order
    pub fn requesters(&self) -> &[ActionRef] {
        &self.requesters
    }

    /// Lock mode shared by all members
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Outstanding holders
    pub fn holders(&self) -> u64 {
        self.holders.load(Ordering::Acquire)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.requesters.len()
    }

    /// Whether the stage has no members
    pub fn is_empty(&self) -> bool {
        self.requesters.is_empty()
    }
}

impl Default for LockStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LockStage {
    fn clone(&self) -> Self {
        Self {
            requesters: self.requesters.clone(),
            lock_type: self.lock_type,
            holders: AtomicU64::new(self.holders()),
            granted: AtomicBool::new(self.has_lock()),
        }
    }
}

impl fmt::Debug for LockStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockStage")
            .field(
                "requesters",
                &self.requesters.iter().map(|a| a.id()).collect::<Vec<_>>(),
            )
            .field("lock_type", &self.lock_type)
            .field("holders", &self.holders())
            .field("granted", &self.has_lock())
            .finish()
    }
}

// Compares data pointers only; vtable pointers of the same type may differ
// across codegen units.
fn same_action(a: &ActionRef, b: &ActionRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
