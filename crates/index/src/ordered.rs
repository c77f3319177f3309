//! Ordered (tree) index implementation.
//!
//! Backed by `alloc::collections::BTreeMap`. Tuples sharing a key in a
//! non-unique index are kept in insertion order.

use crate::traits::{Cursor, Index, IndexError, KeyRange, RangeIndex};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use strata_core::TupleId;

/// An ordered index supporting point lookups and range scans.
#[derive(Debug, Clone)]
pub struct OrderedIndex<K> {
    map: BTreeMap<K, Vec<TupleId>>,
    unique: bool,
    len: usize,
}

impl<K: Ord + Clone> OrderedIndex<K> {
    /// Creates a new ordered index.
    pub fn new(unique: bool) -> Self {
        Self {
            map: BTreeMap::new(),
            unique,
            len: 0,
        }
    }

    /// Returns whether this is a unique index.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Returns the smallest key and its tuples.
    pub fn min(&self) -> Option<(&K, &[TupleId])> {
        self.map.iter().next().map(|(k, v)| (k, v.as_slice()))
    }

    /// Returns the largest key and its tuples.
    pub fn max(&self) -> Option<(&K, &[TupleId])> {
        self.map.iter().next_back().map(|(k, v)| (k, v.as_slice()))
    }
}

impl<K: Ord + Clone> Index<K> for OrderedIndex<K> {
    fn add(&mut self, key: K, value: TupleId) -> Result<(), IndexError> {
        if self.unique {
            if let Some(existing) = self.map.get(&key).and_then(|v| v.first()) {
                return Err(IndexError::DuplicateKey { existing: *existing });
            }
        }
        self.map.entry(key).or_default().push(value);
        self.len += 1;
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<TupleId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn remove(&mut self, key: &K, value: TupleId) -> Result<(), IndexError> {
        let tuples = self.map.get_mut(key).ok_or(IndexError::KeyNotFound)?;
        let pos = tuples
            .iter()
            .position(|t| *t == value)
            .ok_or(IndexError::KeyNotFound)?;
        tuples.remove(pos);
        if tuples.is_empty() {
            self.map.remove(key);
        }
        self.len -= 1;
        Ok(())
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.map.clear();
        self.len = 0;
    }
}

impl<K: Ord + Clone> RangeIndex<K> for OrderedIndex<K> {
    fn get_range(
        &self,
        range: Option<&KeyRange<K>>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<TupleId> {
        let all = KeyRange::All;
        let cursor = self.cursor(range.unwrap_or(&all), reverse).skip(skip).map(|(_, t)| t);
        match limit {
            Some(n) => cursor.take(n).collect(),
            None => cursor.collect(),
        }
    }

    fn cursor<'a>(&'a self, range: &KeyRange<K>, reverse: bool) -> Cursor<'a, K> {
        if range.is_empty_range() {
            return Box::new(core::iter::empty());
        }
        let entries = self.map.range::<K, _>(range.to_bounds());
        if reverse {
            Box::new(
                entries
                    .rev()
                    .flat_map(|(k, tuples)| tuples.iter().rev().map(move |t| (k, *t))),
            )
        } else {
            Box::new(entries.flat_map(|(k, tuples)| tuples.iter().map(move |t| (k, *t))))
        }
    }
}
