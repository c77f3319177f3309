//! Schema-driven index over a table's tuples.
//!
//! `TableIndex` binds an [`IndexDef`] to a concrete backend and takes care of
//! deriving keys from rows: raw columns are projected, expression keys are
//! evaluated, and a partial index only holds rows its predicate accepts.

use crate::hash::HashIndex;
use crate::key::IndexKey;
use crate::ordered::OrderedIndex;
use crate::traits::{Cursor, Index, IndexError, KeyRange, RangeIndex};
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::schema::{IndexDef, IndexKeyDef, IndexType};
use strata_core::{Result, TupleId, Value};

#[derive(Debug, Clone)]
enum Backend {
    Ordered(OrderedIndex<IndexKey>),
    Hash(HashIndex<IndexKey>),
}

/// An index maintained over the tuples of one table.
#[derive(Debug, Clone)]
pub struct TableIndex {
    def: IndexDef,
    backend: Backend,
}

impl TableIndex {
    /// Creates an empty index for `def`.
    pub fn new(def: IndexDef) -> Self {
        let backend = match def.get_index_type() {
            IndexType::BTree => Backend::Ordered(OrderedIndex::new(def.is_unique())),
            IndexType::Hash => Backend::Hash(HashIndex::new(def.is_unique())),
        };
        Self { def, backend }
    }

    /// Returns the index definition.
    #[inline]
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Returns the index name.
    #[inline]
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Returns whether the index enforces uniqueness.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.def.is_unique()
    }

    /// Returns whether the index supports ordered range scans.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        matches!(self.backend, Backend::Ordered(_))
    }

    /// Computes the key `values` would be stored under.
    pub fn key_of(&self, values: &[Value]) -> Result<IndexKey> {
        match self.def.key() {
            IndexKeyDef::Columns(cols) => Ok(IndexKey::new(
                cols.iter()
                    .map(|&c| values.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            )),
            IndexKeyDef::Expressions(exprs) => exprs
                .iter()
                .map(|e| e.eval(values, &[]).map_err(|err| err.with_column(self.name())))
                .collect::<Result<Vec<_>>>()
                .map(IndexKey::new),
        }
    }

    /// Returns whether a row with `values` belongs in this index.
    pub fn covers(&self, values: &[Value]) -> Result<bool> {
        match self.def.get_predicate() {
            Some(p) => p.is_satisfied(values, &[]),
            None => Ok(true),
        }
    }

    /// Adds a tuple. Returns `Ok(false)` when a partial index skips the row.
    pub fn add(
        &mut self,
        values: &[Value],
        tuple: TupleId,
    ) -> core::result::Result<bool, IndexError> {
        if !self.covers(values)? {
            return Ok(false);
        }
        let key = self.key_of(values)?;
        match &mut self.backend {
            Backend::Ordered(ix) => ix.add(key, tuple)?,
            Backend::Hash(ix) => ix.add(key, tuple)?,
        }
        Ok(true)
    }

    /// Removes a tuple. A covered row whose entry is missing is `KeyNotFound`.
    pub fn delete(
        &mut self,
        values: &[Value],
        tuple: TupleId,
    ) -> core::result::Result<bool, IndexError> {
        if !self.covers(values)? {
            return Ok(false);
        }
        let key = self.key_of(values)?;
        match &mut self.backend {
            Backend::Ordered(ix) => ix.remove(&key, tuple)?,
            Backend::Hash(ix) => ix.remove(&key, tuple)?,
        }
        Ok(true)
    }

    /// Returns the tuple other than `exclude` that already holds the key
    /// `values` would take, if this unique index would reject them.
    pub fn find_conflict(
        &self,
        values: &[Value],
        exclude: Option<TupleId>,
    ) -> core::result::Result<Option<TupleId>, IndexError> {
        if !self.is_unique() || !self.covers(values)? {
            return Ok(None);
        }
        let key = self.key_of(values)?;
        Ok(self.lookup(&key).into_iter().find(|t| Some(*t) != exclude))
    }

    /// Returns true if the key is present.
    pub fn exists(&self, key: &IndexKey) -> bool {
        match &self.backend {
            Backend::Ordered(ix) => ix.contains_key(key),
            Backend::Hash(ix) => ix.contains_key(key),
        }
    }

    /// Returns the tuples stored under `key` (at most one for a unique index).
    pub fn lookup(&self, key: &IndexKey) -> Vec<TupleId> {
        match &self.backend {
            Backend::Ordered(ix) => ix.get(key),
            Backend::Hash(ix) => ix.get(key),
        }
    }

    /// Walks entries inside `range`. Hash indexes yield matches unordered.
    pub fn cursor<'a>(&'a self, range: &KeyRange<IndexKey>, reverse: bool) -> Cursor<'a, IndexKey> {
        match &self.backend {
            Backend::Ordered(ix) => ix.cursor(range, reverse),
            Backend::Hash(ix) => {
                let range = range.clone();
                Box::new(ix.iter().filter(move |(k, _)| range.contains(k)))
            }
        }
    }

    /// Walks every entry whose key starts with `prefix`, from the low end
    /// (`reverse == false`) or the high end.
    pub fn prefix_cursor<'a>(&'a self, prefix: &[Value], reverse: bool) -> Cursor<'a, IndexKey> {
        let range = KeyRange::bound(
            IndexKey::new(prefix.to_vec()),
            IndexKey::after_prefix(prefix.to_vec()),
            false,
            true,
        );
        self.cursor(&range, reverse)
    }

    /// Returns true if moving a row from `old` to `new` changes its entry,
    /// either because the key differs or because predicate membership flips.
    pub fn key_changed(&self, old: &[Value], new: &[Value]) -> Result<bool> {
        let (was, is) = (self.covers(old)?, self.covers(new)?);
        if was != is {
            return Ok(true);
        }
        if !was {
            return Ok(false);
        }
        Ok(self.key_of(old)? != self.key_of(new)?)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Ordered(ix) => ix.len(),
            Backend::Hash(ix) => ix.len(),
        }
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        match &mut self.backend {
            Backend::Ordered(ix) => ix.clear(),
            Backend::Hash(ix) => ix.clear(),
        }
    }

    /// Returns every entry sorted by key, then tuple.
    pub fn snapshot(&self) -> Vec<(IndexKey, TupleId)> {
        let mut out: Vec<(IndexKey, TupleId)> = self
            .cursor(&KeyRange::All, false)
            .map(|(k, t)| (k.clone(), t))
            .collect();
        out.sort();
        out
    }
}
