//! Table definition for table schemas.

use super::column::Column;
use super::index::IndexDef;
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A table definition.
#[derive(Clone, Debug)]
pub struct Table {
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<Column>,
    /// Index definitions, in declaration order.
    indices: Vec<IndexDef>,
    /// Position of the primary key in `indices`.
    primary_key: Option<usize>,
    /// Column whose value decides the owning partition.
    partition_column: Option<usize>,
    /// Whether every partition holds an identical copy.
    replicated: bool,
    /// Stable hash of the name and column layout.
    signature: u64,
}

impl Table {
    /// Creates a new table with the given name and columns, without indexes.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let columns: Vec<Column> = columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_index(i))
            .collect();
        let signature = compute_signature(&name, &columns);

        Self {
            name,
            columns,
            indices: Vec::new(),
            primary_key: None,
            partition_column: None,
            replicated: false,
            signature,
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Returns the indices in declaration order.
    #[inline]
    pub fn indices(&self) -> &[IndexDef] {
        &self.indices
    }

    /// Returns the primary key index if defined.
    pub fn primary_key(&self) -> Option<&IndexDef> {
        self.primary_key.map(|i| &self.indices[i])
    }

    /// Returns the position of the primary key among the indices.
    #[inline]
    pub fn primary_key_position(&self) -> Option<usize> {
        self.primary_key
    }

    /// Returns the partitioning column, if the table is partitioned on one.
    #[inline]
    pub fn partition_column(&self) -> Option<usize> {
        self.partition_column
    }

    /// Returns whether the table is replicated to every partition.
    #[inline]
    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// Returns the signature used to address change-log records.
    #[inline]
    pub fn signature(&self) -> u64 {
        self.signature
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column index by name.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Gets an index by name.
    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indices.iter().find(|i| i.name() == name)
    }

    /// Columns that reject NULL.
    pub fn not_null_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_nullable())
    }
}

fn compute_signature(name: &str, columns: &[Column]) -> u64 {
    let mut buf = Vec::with_capacity(name.len() + columns.len() * 2);
    buf.extend_from_slice(name.as_bytes());
    for c in columns {
        buf.push(c.data_type().tag());
        buf.push(c.is_nullable() as u8);
    }
    xxhash_rust::xxh3::xxh3_64(&buf)
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    indices: Vec<IndexDef>,
    pk: Option<IndexDef>,
    partition_column: Option<usize>,
    replicated: bool,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            indices: Vec::new(),
            pk: None,
            partition_column: None,
            replicated: false,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    fn push_column(mut self, column: Column) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self.columns.iter().any(|c| c.name() == column.name()) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Adds a non-nullable column to the table.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.push_column(Column::new(name, data_type))
    }

    /// Adds a hidden system column.
    pub fn add_hidden_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.push_column(Column::new(name, data_type).hidden(true))
    }

    /// Marks existing columns as nullable.
    pub fn add_nullable(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(true);
            }
        }
        self
    }

    fn resolve(&self, columns: &[&str]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c.name() == *name)
                    .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", name)))
            })
            .collect()
    }

    /// Sets the primary key. It is always a unique tree index.
    pub fn add_primary_key(mut self, columns: &[&str]) -> Result<Self> {
        let pk_name = format!("pk{}", capitalize(&self.name));
        Self::check_naming_rules(&pk_name)?;
        let cols = self.resolve(columns)?;
        self.pk = Some(IndexDef::on_columns(pk_name, &self.name, cols).unique(true));
        Ok(self)
    }

    /// Adds a unique constraint backed by a tree index.
    pub fn add_unique(self, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        self.add_index(name, columns, true)
    }

    /// Adds a tree index over raw columns.
    pub fn add_index(
        self,
        name: impl Into<String>,
        columns: &[&str],
        unique: bool,
    ) -> Result<Self> {
        let cols = self.resolve(columns)?;
        let def = IndexDef::on_columns(name, &self.name, cols).unique(unique);
        self.add_index_def(def)
    }

    /// Adds a fully specified index (hash, expression-based or partial).
    pub fn add_index_def(mut self, def: IndexDef) -> Result<Self> {
        Self::check_naming_rules(def.name())?;
        if self.indices.iter().any(|i| i.name() == def.name()) {
            return Err(Error::invalid_schema(format!("Index already exists: {}", def.name())));
        }
        if def.key().width() == 0 {
            return Err(Error::invalid_schema(format!("Index {} has an empty key", def.name())));
        }
        if let Some(bad) = def.referenced_columns().into_iter().find(|c| *c >= self.columns.len()) {
            return Err(Error::invalid_schema(format!(
                "Index {} references column {} of a {}-column table",
                def.name(),
                bad,
                self.columns.len()
            )));
        }
        self.indices.push(def);
        Ok(self)
    }

    /// Partitions the table on `column`.
    pub fn partition_by(mut self, column: &str) -> Result<Self> {
        let col = self.resolve(&[column])?;
        self.partition_column = col.first().copied();
        Ok(self)
    }

    /// Sets whether the table is replicated.
    pub fn replicated(mut self, replicated: bool) -> Self {
        self.replicated = replicated;
        self
    }

    /// Builds the table definition.
    pub fn build(self) -> Result<Table> {
        if self.replicated && self.partition_column.is_some() {
            return Err(Error::invalid_schema(format!(
                "Table {} cannot be both replicated and partitioned",
                self.name
            )));
        }
        if let Some(pc) = self.partition_column {
            if self.columns[pc].is_nullable() {
                return Err(Error::invalid_schema(format!(
                    "Partitioning column {} must be NOT NULL",
                    self.columns[pc].name()
                )));
            }
        }

        let mut table = Table::new(self.name, self.columns);
        table.indices = self.indices;
        if let Some(pk) = self.pk {
            table.primary_key = Some(table.indices.len());
            table.indices.push(pk);
        }
        table.partition_column = self.partition_column;
        table.replicated = self.replicated;
        Ok(table)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().chain(chars).collect(),
    }
}
