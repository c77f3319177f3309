//! Composite index keys.
//!
//! An `IndexKey` is the tuple of values an index stores for one row. Keys
//! compare lexicographically; a shorter key that is a prefix of a longer one
//! sorts before it, unless it was built with [`IndexKey::after_prefix`], in
//! which case it sorts after every key sharing the prefix. That lets a range
//! scan address "all keys starting with these values" from either end.

use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::Value;

/// A composite index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexKey {
    values: Vec<Value>,
    after_prefix: bool,
}

impl IndexKey {
    /// Creates a full key, or a prefix that sorts before its extensions.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            after_prefix: false,
        }
    }

    /// Creates a prefix that sorts after every key extending it.
    pub fn after_prefix(values: Vec<Value>) -> Self {
        Self {
            values,
            after_prefix: true,
        }
    }

    /// Returns the key values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of key components.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the key has no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true if the first components of this key equal `prefix`.
    pub fn starts_with(&self, prefix: &[Value]) -> bool {
        self.values.len() >= prefix.len()
            && self
                .values
                .iter()
                .zip(prefix)
                .all(|(a, b)| a.cmp(b) == Ordering::Equal)
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(values: Vec<Value>) -> Self {
        IndexKey::new(values)
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.values.iter().zip(&other.values) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        match self.values.len().cmp(&other.values.len()) {
            Ordering::Equal => self.after_prefix.cmp(&other.after_prefix),
            Ordering::Less if self.after_prefix => Ordering::Greater,
            Ordering::Less => Ordering::Less,
            Ordering::Greater if other.after_prefix => Ordering::Less,
            Ordering::Greater => Ordering::Greater,
        }
    }
}
