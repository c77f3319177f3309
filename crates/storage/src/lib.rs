//! Strata Storage - Tuple storage and the mutation protocol.
//!
//! This crate provides the storage layer of one partition:
//!
//! - `TupleStorage`: Block-organised tuple slots with header flags
//! - `RowStore`: One table's tuples, indexes, delta table and attached views
//! - `TableRegistry`: Arena of row stores that drives insert/update/delete
//! - `UndoLog`: Token-scoped reversible actions
//! - `ChangeLog`: Replication hand-off, with an in-memory implementation
//! - `ViewMaintainer`: The hook view maintenance plugs into
//!
//! # Example
//!
//! ```rust
//! use strata_storage::{StorageConfig, TableRegistry};
//! use strata_core::schema::TableBuilder;
//! use strata_core::{DataType, Row, Value};
//!
//! let mut registry = TableRegistry::new(StorageConfig::default());
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let users = registry.create_table(schema).unwrap();
//!
//! let token = registry.begin();
//! let row = Row::new(vec![Value::Int64(1), Value::from("Alice")]);
//! registry.insert(users, row).unwrap();
//! registry.undo(token).unwrap();
//!
//! assert!(registry.table(users).unwrap().is_empty());
//! ```

#![no_std]

extern crate alloc;

pub mod changelog;
mod config;
pub mod delta;
pub mod registry;
pub mod row_store;
mod stats;
pub mod tuple;
pub mod undo;
pub mod view;

pub use changelog::{ChangeKind, ChangeLog, ChangeRecord, LogPosition, MemoryChangeLog};
pub use config::StorageConfig;
pub use delta::DeltaTable;
pub use registry::{TableId, TableRegistry};
pub use row_store::{IndexSelection, RowStore, ScanBatch};
pub use stats::TableStats;
pub use tuple::{TupleFlags, TupleStorage};
pub use undo::{
    ExternalAction, ExternalUndo, UndoAction, UndoLog, UndoOutcome, UndoToken, UpdateImage,
};
pub use view::{ViewKind, ViewMaintainer};

use alloc::string::String;
use strata_core::Error;

/// Logs and builds a fatal error.
pub(crate) fn fatal(message: String) -> Error {
    tracing::error!(%message, "fatal storage error");
    Error::fatal(message)
}
