//! Index trait definitions.
//!
//! This module defines the `Index` and `RangeIndex` traits every key→tuple
//! structure satisfies, plus the `KeyRange` used to bound range scans.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::{Bound, RangeBounds};
use strata_core::{Error, TupleId};
use thiserror::Error;

/// Bounds of an index range scan.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyRange<K> {
    All,
    /// Exactly one key.
    Only(K),
    LowerBound { value: K, exclusive: bool },
    UpperBound { value: K, exclusive: bool },
    Bound {
        lower: K,
        upper: K,
        lower_exclusive: bool,
        upper_exclusive: bool,
    },
}

impl<K: Clone + Ord> KeyRange<K> {
    pub fn lower_bound(value: K, exclusive: bool) -> Self {
        KeyRange::LowerBound { value, exclusive }
    }

    pub fn upper_bound(value: K, exclusive: bool) -> Self {
        KeyRange::UpperBound { value, exclusive }
    }

    pub fn bound(lower: K, upper: K, lower_exclusive: bool, upper_exclusive: bool) -> Self {
        KeyRange::Bound {
            lower,
            upper,
            lower_exclusive,
            upper_exclusive,
        }
    }

    /// Returns true if `key` falls inside the range.
    pub fn contains(&self, key: &K) -> bool {
        RangeBounds::contains(&self.to_bounds(), key)
    }

    /// Converts the range into `BTreeMap::range` bounds.
    pub fn to_bounds(&self) -> (Bound<&K>, Bound<&K>) {
        fn edge<K>(value: &K, exclusive: bool) -> Bound<&K> {
            if exclusive {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            }
        }
        match self {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(k) => (Bound::Included(k), Bound::Included(k)),
            KeyRange::LowerBound { value, exclusive } => {
                (edge(value, *exclusive), Bound::Unbounded)
            }
            KeyRange::UpperBound { value, exclusive } => {
                (Bound::Unbounded, edge(value, *exclusive))
            }
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => (edge(lower, *lower_exclusive), edge(upper, *upper_exclusive)),
        }
    }

    /// Returns true if no key can satisfy the range.
    pub fn is_empty_range(&self) -> bool {
        match self {
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => lower > upper || (lower == upper && (*lower_exclusive || *upper_exclusive)),
            _ => false,
        }
    }
}

/// A borrowed stream of `(key, tuple)` entries in index order.
pub type Cursor<'a, K> = Box<dyn Iterator<Item = (&'a K, TupleId)> + 'a>;

/// Core trait for all index implementations.
pub trait Index<K> {
    /// Adds a key-tuple pair to the index.
    /// For unique indexes, this fails with the tuple already holding the key.
    fn add(&mut self, key: K, value: TupleId) -> Result<(), IndexError>;

    /// Gets all tuples associated with a key.
    fn get(&self, key: &K) -> Vec<TupleId>;

    /// Removes exactly one key-tuple pair. A missing pair is `KeyNotFound`.
    fn remove(&mut self, key: &K, value: TupleId) -> Result<(), IndexError>;

    /// Checks if the index contains the given key.
    fn contains_key(&self, key: &K) -> bool;

    /// Returns the number of entries in the index.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries from the index.
    fn clear(&mut self);
}

/// Trait for indexes that support ordered range queries.
pub trait RangeIndex<K>: Index<K> {
    /// Gets all tuples within the given key range.
    fn get_range(
        &self,
        range: Option<&KeyRange<K>>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<TupleId>;

    /// Walks `(key, tuple)` entries inside `range`, forward or backward.
    fn cursor<'a>(&'a self, range: &KeyRange<K>, reverse: bool) -> Cursor<'a, K>;
}

/// Error type for index operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum IndexError {
    /// Attempted to insert a duplicate key in a unique index.
    #[error("duplicate key in unique index, held by tuple {existing}")]
    DuplicateKey { existing: TupleId },
    /// The key/tuple pair is not in the index.
    #[error("key not found")]
    KeyNotFound,
    /// A key expression or partial-index predicate failed to evaluate.
    #[error(transparent)]
    Evaluation(#[from] Error),
}
