//! Strata Views - Incrementally maintained aggregate views.
//!
//! A view keeps one destination row per group of its source rows, holding
//! SUM, COUNT, COUNT(*), MIN and MAX aggregates. The destination is updated
//! in the same undo scope as the source mutation that caused it, so undoing
//! a source change also undoes its effect on every view.
//!
//! # Core Concepts
//!
//! - `ViewDefinition`: Group-by expressions, aggregate columns and row filter
//! - `SingleTableView`: Merges each changed source row directly
//! - `MultiTableView`: Merges the output of a delta plan over a join
//! - `QueryPlan`: Plans run in delta mode or as MIN/MAX fallbacks
//! - `MinMaxFallback`: Sequential, indexed or plan-driven MIN/MAX recompute
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::TableBuilder;
//! use strata_core::{DataType, Expr, Row, Value};
//! use strata_storage::{StorageConfig, TableRegistry};
//! use strata_views::{AggregateColumn, SingleTableView, ViewDefinition};
//!
//! let mut registry = TableRegistry::new(StorageConfig::default());
//! let t = registry
//!     .create_table(
//!         TableBuilder::new("t")
//!             .unwrap()
//!             .add_column("a", DataType::Int64)
//!             .unwrap()
//!             .add_column("b", DataType::Int64)
//!             .unwrap()
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let definition = ViewDefinition::builder("v")
//!     .group_by_column(0)
//!     .aggregate(AggregateColumn::count_star())
//!     .aggregate(AggregateColumn::sum(Expr::column(1)))
//!     .build()
//!     .unwrap();
//! let schema = definition
//!     .destination_schema(
//!         "v",
//!         &[("a", DataType::Int64)],
//!         &[("c", DataType::Int64), ("s", DataType::Int64)],
//!     )
//!     .unwrap();
//! let v = registry.create_table(schema).unwrap();
//! SingleTableView::new(&registry, definition, t, v)
//!     .unwrap()
//!     .install(&mut registry)
//!     .unwrap();
//!
//! registry.begin();
//! registry.insert(t, Row::new(vec![Value::Int64(1), Value::Int64(10)])).unwrap();
//! registry.insert(t, Row::new(vec![Value::Int64(1), Value::Int64(20)])).unwrap();
//!
//! let rows: Vec<_> = registry.scan(v).unwrap().map(|(_, r)| r.clone()).collect();
//! assert_eq!(rows, vec![Row::new(vec![Value::Int64(1), Value::Int64(2), Value::Int64(30)])]);
//! ```

#![no_std]

extern crate alloc;

pub mod definition;
pub mod handler;
mod merge;
pub mod plan;
pub mod trigger;

pub use definition::{
    AggregateColumn, AggregateKind, ViewDefinition, ViewDefinitionBuilder, HIDDEN_COUNT_COLUMN,
};
pub use handler::MultiTableView;
pub use plan::{JoinAggregatePlan, MinMaxFallbackPlan, QueryPlan};
pub use trigger::{MinMaxFallback, SingleTableView};

use alloc::string::String;
use strata_core::Error;

/// Logs and builds a fatal error.
pub(crate) fn fatal(message: String) -> Error {
    tracing::error!(%message, "fatal view maintenance error");
    Error::fatal(message)
}
