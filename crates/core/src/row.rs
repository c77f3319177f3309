//! Row images and tuple addresses.
//!
//! A `Row` is a detached image of a tuple's column values; a `TupleId` is the
//! address of the storage slot that holds the live copy.

use crate::value::Value;
use alloc::vec::Vec;
use core::fmt;

/// Address of a tuple slot: storage block number and slot within the block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TupleId {
    block: u32,
    slot: u32,
}

impl TupleId {
    /// Creates a tuple address.
    #[inline]
    pub const fn new(block: u32, slot: u32) -> Self {
        Self { block, slot }
    }

    /// Returns the block number.
    #[inline]
    pub fn block(&self) -> u32 {
        self.block
    }

    /// Returns the slot within the block.
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Packs the address into a single integer, ordered by (block, slot).
    #[inline]
    pub fn as_u64(&self) -> u64 {
        ((self.block as u64) << 32) | self.slot as u64
    }
}

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.slot)
    }
}

/// A row of column values.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row of `width` nulls.
    pub fn nulls(width: usize) -> Self {
        Self {
            values: alloc::vec![Value::Null; width],
        }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns a mutable reference to the values.
    #[inline]
    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    /// Returns a row made of the values at `columns`, in that order.
    pub fn project(&self, columns: &[usize]) -> Row {
        Row::new(
            columns
                .iter()
                .map(|&c| self.values.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Appends the canonical encoding of every value to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.values.len() as u32).to_le_bytes());
        for v in &self.values {
            v.encode_into(out);
        }
    }

    /// Stable 64-bit digest of the row's contents.
    pub fn digest(&self) -> u64 {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        xxhash_rust::xxh3::xxh3_64(&buf)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}
