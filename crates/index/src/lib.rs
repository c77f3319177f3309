//! Strata Index - Index implementations for the Strata storage engine.
//!
//! This crate provides the key→tuple structures a row store maintains:
//!
//! - `OrderedIndex`: Ordered point and range queries over a `BTreeMap`
//! - `HashIndex`: O(1) point queries using hash map
//! - `TableIndex`: Schema-driven wrapper deriving keys from rows, with
//!   expression keys and partial-index predicates
//!
//! # Example
//!
//! ```rust
//! use strata_core::TupleId;
//! use strata_index::{HashIndex, Index, KeyRange, OrderedIndex, RangeIndex};
//!
//! let t = |slot| TupleId::new(0, slot);
//!
//! let mut tree: OrderedIndex<i32> = OrderedIndex::new(true);
//! tree.add(10, t(1)).unwrap();
//! tree.add(20, t(2)).unwrap();
//! tree.add(5, t(0)).unwrap();
//!
//! // Point query
//! assert_eq!(tree.get(&10), vec![t(1)]);
//!
//! // Range query
//! let range = KeyRange::lower_bound(10, false);
//! assert_eq!(tree.get_range(Some(&range), false, None, 0), vec![t(1), t(2)]);
//!
//! let mut hash: HashIndex<i32> = HashIndex::new(true);
//! hash.add(10, t(1)).unwrap();
//! assert_eq!(hash.get(&10), vec![t(1)]);
//! ```

#![no_std]

extern crate alloc;

pub mod hash;
pub mod key;
pub mod ordered;
pub mod table_index;
pub mod traits;

pub use hash::HashIndex;
pub use key::IndexKey;
pub use ordered::OrderedIndex;
pub use table_index::TableIndex;
pub use traits::{Cursor, Index, IndexError, KeyRange, RangeIndex};
