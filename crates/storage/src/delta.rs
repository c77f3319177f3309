//! Single-row delta table.
//!
//! A row store that feeds at least one multi-table view keeps a delta table
//! with its own schema. Each mutation copies the changed image into it, and
//! while the owner is in delta mode every scan of the owner reads the delta
//! table instead of the full contents.

use strata_core::{Row, TupleId};

/// Holds the most recently changed row of its owner.
#[derive(Clone, Debug, Default)]
pub struct DeltaTable {
    entry: Option<(TupleId, Row)>,
}

impl DeltaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the table and stores `row` as its only content.
    pub fn set(&mut self, tuple: TupleId, row: Row) {
        self.entry = Some((tuple, row));
    }

    /// Empties the table.
    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Returns the held row and the owner tuple it came from.
    pub fn entry(&self) -> Option<(TupleId, &Row)> {
        self.entry.as_ref().map(|(t, r)| (*t, r))
    }

    pub fn len(&self) -> usize {
        usize::from(self.entry.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::Value;

    #[test]
    fn test_holds_at_most_one_row() {
        let mut delta = DeltaTable::new();
        assert!(delta.is_empty());
        delta.set(TupleId::new(0, 0), Row::new(vec![Value::Int64(1)]));
        delta.set(TupleId::new(0, 1), Row::new(vec![Value::Int64(2)]));
        assert_eq!(delta.len(), 1);
        let (tuple, row) = delta.entry().unwrap();
        assert_eq!(tuple, TupleId::new(0, 1));
        assert_eq!(row.get(0), Some(&Value::Int64(2)));
        delta.clear();
        assert!(delta.entry().is_none());
    }
}
