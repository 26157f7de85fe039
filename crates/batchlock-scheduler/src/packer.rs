//! Greedy conflict-free packing
//!
//! A packing is built by one left-to-right scan over the unpacked actions.
//! An action joins when
//!
//! - its write set misses every key already locked by the packing, and
//! - its read set misses every key already write-locked by the packing.
//!
//! Skipped actions stay in the cursor for the next packing, so calling
//! `get_packing` until the cursor is empty packs every action exactly once.

use crate::cursor::BatchCursor;
use batchlock_types::{ActionRef, BatchAction, RecordKeySet};

/// Builds packings, reusing its key sets between calls
#[derive(Debug, Default)]
pub struct Packer {
    held_exclusive: RecordKeySet,
    held_shared: RecordKeySet,
}

impl Packer {
    /// Create a packer
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next packing out of `cursor`.
    ///
    /// The result is maximal for the scan order and keeps arrival order.
    pub fn get_packing(&mut self, cursor: &mut BatchCursor) -> Vec<ActionRef> {
        self.held_exclusive.clear();
        self.held_shared.clear();

        let mut packing = Vec::with_capacity(cursor.remaining());
        while let Some(next) = cursor.peek() {
            if self.conflicts(&**next) {
                cursor.advance();
                continue;
            }

            self.held_exclusive.extend(next.write_set().iter().copied());
            self.held_shared.extend(next.read_set().iter().copied());
            if let Some(action) = cursor.take() {
                packing.push(action);
            }
        }
        packing
    }

    fn conflicts(&self, action: &dyn BatchAction) -> bool {
        let exclusive = action.write_set();
        let shared = action.read_set();

        intersects(exclusive, &self.held_exclusive)
            || intersects(exclusive, &self.held_shared)
            || intersects(shared, &self.held_exclusive)
    }
}

/// Whether two key sets share a key; iterates the smaller one
pub fn intersects(a: &RecordKeySet, b: &RecordKeySet) -> bool {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    smaller.iter().any(|key| larger.contains(key))
}
