//! Schema module for the Strata storage engine.
//!
//! This module contains the schema definitions a row store is built from:
//! columns, indexes and tables.

mod column;
mod index;
mod table;

pub use column::Column;
pub use index::{IndexDef, IndexKeyDef, IndexType};
pub use table::{Table, TableBuilder};
