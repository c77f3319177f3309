//! Index definition for table schemas.

use crate::expr::Expr;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// Index type enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Hash index - O(1) point lookups, no range scans.
    Hash,
    /// Ordered tree index - O(log n) lookups and range scans.
    BTree,
}

/// How an index derives its key from a row.
#[derive(Clone, Debug)]
pub enum IndexKeyDef {
    /// Raw column values, by position.
    Columns(Vec<usize>),
    /// One computed value per expression.
    Expressions(Vec<Expr>),
}

impl IndexKeyDef {
    /// Returns the number of key components.
    pub fn width(&self) -> usize {
        match self {
            IndexKeyDef::Columns(c) => c.len(),
            IndexKeyDef::Expressions(e) => e.len(),
        }
    }
}

/// An index definition in a table schema.
#[derive(Clone, Debug)]
pub struct IndexDef {
    /// Index name.
    name: String,
    /// Table name this index belongs to.
    table_name: String,
    /// Key definition.
    key: IndexKeyDef,
    /// Whether this index enforces uniqueness.
    unique: bool,
    /// Index type.
    index_type: IndexType,
    /// Partial-index predicate; rows failing it are not indexed.
    predicate: Option<Expr>,
}

impl IndexDef {
    /// Creates a new non-unique tree index definition.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>, key: IndexKeyDef) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            key,
            unique: false,
            index_type: IndexType::BTree,
            predicate: None,
        }
    }

    /// Creates a tree index over raw columns.
    pub fn on_columns(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<usize>,
    ) -> Self {
        Self::new(name, table_name, IndexKeyDef::Columns(columns))
    }

    /// Sets whether this index is unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the index type.
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    /// Makes this a partial index guarded by `predicate`.
    pub fn predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Returns the index name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table name.
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the normalized name (table.index).
    pub fn normalized_name(&self) -> String {
        format!("{}.{}", self.table_name, self.name)
    }

    /// Returns the key definition.
    #[inline]
    pub fn key(&self) -> &IndexKeyDef {
        &self.key
    }

    /// Returns the key columns when the key is made of raw columns.
    pub fn key_columns(&self) -> Option<&[usize]> {
        match &self.key {
            IndexKeyDef::Columns(c) => Some(c),
            IndexKeyDef::Expressions(_) => None,
        }
    }

    /// Returns whether this index enforces uniqueness.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns the index type.
    #[inline]
    pub fn get_index_type(&self) -> IndexType {
        self.index_type
    }

    /// Returns the partial-index predicate, if any.
    #[inline]
    pub fn get_predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }

    /// Returns whether this is a partial index.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.predicate.is_some()
    }

    /// Returns every column the key or the predicate reads.
    pub fn referenced_columns(&self) -> Vec<usize> {
        let mut cols = match &self.key {
            IndexKeyDef::Columns(c) => c.clone(),
            IndexKeyDef::Expressions(exprs) => {
                let mut out = Vec::new();
                for e in exprs {
                    for c in e.referenced_columns() {
                        if !out.contains(&c) {
                            out.push(c);
                        }
                    }
                }
                out
            }
        };
        if let Some(p) = &self.predicate {
            for c in p.referenced_columns() {
                if !cols.contains(&c) {
                    cols.push(c);
                }
            }
        }
        cols
    }
}

impl PartialEq for IndexDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.table_name == other.table_name
    }
}
