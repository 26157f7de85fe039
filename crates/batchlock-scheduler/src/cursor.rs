//! Cursor over the not-yet-packed actions of a batch

use batchlock_types::ActionRef;

/// Arrival-ordered container the packer scans and takes from
///
/// Taking an action leaves a hole; `compact` closes the holes and rewinds so
/// the skipped actions are retried in their original order.
#[derive(Debug, Default)]
pub struct BatchCursor {
    slots: Vec<Option<ActionRef>>,
    position: usize,
    remaining: usize,
}

impl BatchCursor {
    /// Create a cursor positioned on the first action
    pub fn new(actions: Vec<ActionRef>) -> Self {
        let remaining = actions.len();
        Self {
            slots: actions.into_iter().map(Some).collect(),
            position: 0,
            remaining,
        }
    }

    /// Action under the cursor, if the scan has not reached the end
    pub fn peek(&self) -> Option<&ActionRef> {
        self.slots.get(self.position).and_then(Option::as_ref)
    }

    /// Skip the action under the cursor
    pub fn advance(&mut self) {
        if self.position < self.slots.len() {
            self.position += 1;
        }
    }

    /// Remove the action under the cursor and move past it
    pub fn take(&mut self) -> Option<ActionRef> {
        let taken = self.slots.get_mut(self.position).and_then(Option::take);
        if taken.is_some() {
            self.remaining -= 1;
            self.position += 1;
        }
        taken
    }

    /// Number of actions not taken yet
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether every action was taken
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Drop taken slots and rewind to the first remaining action
    pub fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlock_types::Action;

    fn cursor(n: u64) -> BatchCursor {
        BatchCursor::new((0..n).map(|i| Action::new(i).into_ref()).collect())
    }

    fn peek_id(c: &BatchCursor) -> Option<u64> {
        c.peek().map(|a| a.id().as_u64())
    }

    #[test]
    fn test_empty_cursor() {
        let mut c = BatchCursor::new(Vec::new());
        assert!(c.peek().is_none());
        assert!(c.take().is_none());
        assert!(c.is_empty());
        c.advance();
        c.compact();
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_scan_take_and_skip() {
        let mut c = cursor(4);
        assert_eq!(peek_id(&c), Some(0));

        assert_eq!(c.take().unwrap().id().as_u64(), 0);
        c.advance();
        assert_eq!(c.take().unwrap().id().as_u64(), 2);
        c.advance();
        assert!(c.peek().is_none());
        assert_eq!(c.remaining(), 2);
    }

    #[test]
    fn test_compact_preserves_arrival_order() {
        let mut c = cursor(5);
        c.take();
        c.advance();
        c.take();
        c.advance();
        c.take();
        c.compact();

        assert_eq!(c.remaining(), 2);
        assert_eq!(peek_id(&c), Some(1));
        c.advance();
        assert_eq!(peek_id(&c), Some(3));
    }

    #[test]
    fn test_advance_past_end_is_noop() {
        let mut c = cursor(1);
        c.advance();
        c.advance();
        assert!(c.peek().is_none());
        c.compact();
        assert_eq!(peek_id(&c), Some(0));
    }
}
