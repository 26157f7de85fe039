//! Record keys and lock modes

use std::collections::HashSet;
use std::fmt;

/// Identifier of one lockable record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(pub u64);

impl RecordKey {
    /// Create a new record key
    pub fn new(key: u64) -> Self {
        Self(key)
    }

    /// Get the raw key value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

impl From<u32> for RecordKey {
    fn from(key: u32) -> Self {
        Self(key as u64)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

/// Set of record keys touched by an action
pub type RecordKeySet = HashSet<RecordKey>;

/// Action identifier, unique within one admission stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u64);

impl ActionId {
    /// Create a new action ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ActionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<usize> for ActionId {
    fn from(id: usize) -> Self {
        Self(id as u64)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// Lock mode requested on a record
///
/// Reads request `Shared`, writes request `Exclusive`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Any number of shared holders may coexist
    #[default]
    Shared,
    /// A single holder, excluding everyone else
    Exclusive,
}

impl LockType {
    /// Whether two requests of these modes may be granted together
    pub fn is_compatible_with(self, other: LockType) -> bool {
        matches!((self, other), (LockType::Shared, LockType::Shared))
    }
}
