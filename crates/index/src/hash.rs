//! Hash index implementation.
//!
//! This module provides a hash-based index for O(1) point queries.

use crate::traits::{Index, IndexError};
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::TupleId;

/// A hash-based index for O(1) point queries.
///
/// This index uses a HashMap internally and supports both unique and non-unique indexes.
/// It does not support range queries.
#[derive(Debug, Clone)]
pub struct HashIndex<K> {
    /// The underlying map from keys to tuples.
    map: HashMap<K, Vec<TupleId>>,
    /// Whether this is a unique index.
    unique: bool,
    /// Total number of key/tuple entries.
    len: usize,
}

impl<K: Eq + core::hash::Hash + Clone> HashIndex<K> {
    /// Creates a new hash index.
    pub fn new(unique: bool) -> Self {
        Self {
            map: HashMap::new(),
            unique,
            len: 0,
        }
    }

    /// Returns whether this is a unique index.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Iterates every `(key, tuple)` entry in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, TupleId)> + '_ {
        self.map
            .iter()
            .flat_map(|(k, tuples)| tuples.iter().map(move |t| (k, *t)))
    }
}

impl<K: Eq + core::hash::Hash + Clone> Index<K> for HashIndex<K> {
    fn add(&mut self, key: K, value: TupleId) -> Result<(), IndexError> {
        if self.unique {
            if let Some(existing) = self.map.get(&key).and_then(|v| v.first()) {
                return Err(IndexError::DuplicateKey { existing: *existing });
            }
        }

        self.map.entry(key).or_insert_with(Vec::new).push(value);
        self.len += 1;
        Ok(())
    }

    fn get(&self, key: &K) -> Vec<TupleId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn remove(&mut self, key: &K, value: TupleId) -> Result<(), IndexError> {
        let values = self.map.get_mut(key).ok_or(IndexError::KeyNotFound)?;
        let original_len = values.len();
        values.retain(|&x| x != value);
        if values.len() == original_len {
            return Err(IndexError::KeyNotFound);
        }
        self.len -= original_len - values.len();
        if values.is_empty() {
            self.map.remove(key);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn t(slot: u32) -> TupleId {
        TupleId::new(1, slot)
    }

    #[test]
    fn test_hash_index_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(true);

        assert!(index.add(1, t(100)).is_ok());
        assert!(index.add(2, t(200)).is_ok());
        assert_eq!(
            index.add(1, t(101)),
            Err(IndexError::DuplicateKey { existing: t(100) })
        );

        assert_eq!(index.get(&1), vec![t(100)]);
        assert_eq!(index.get(&3), Vec::<TupleId>::new());
    }

    #[test]
    fn test_hash_index_non_unique() {
        let mut index: HashIndex<i32> = HashIndex::new(false);

        assert!(index.add(1, t(100)).is_ok());
        assert!(index.add(1, t(101)).is_ok()); // Duplicate key allowed
        assert!(index.add(2, t(200)).is_ok());

        assert_eq!(index.get(&1), vec![t(100), t(101)]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.iter().count(), 3);
    }

    #[test]
    fn test_hash_index_remove() {
        let mut index: HashIndex<i32> = HashIndex::new(false);

        index.add(1, t(100)).unwrap();
        index.add(1, t(101)).unwrap();

        index.remove(&1, t(100)).unwrap();
        assert_eq!(index.get(&1), vec![t(101)]);
        assert_eq!(index.remove(&1, t(100)), Err(IndexError::KeyNotFound));
        assert_eq!(index.remove(&9, t(100)), Err(IndexError::KeyNotFound));

        index.remove(&1, t(101)).unwrap();
        assert!(!index.contains_key(&1));
        assert!(index.is_empty());
    }

    #[test]
    fn test_hash_index_clear() {
        let mut index: HashIndex<i32> = HashIndex::new(false);
        index.add(1, t(1)).unwrap();
        index.clear();
        assert_eq!(index.len(), 0);
        assert!(!index.contains_key(&1));
    }
}
