//! Strata Core - Core types and schema definitions for the Strata storage engine.
//!
//! This crate provides the foundational types shared by every layer of the engine:
//!
//! - `DataType`: Column data types (Boolean, Int32, Int64, Float64, String, Timestamp, Bytes)
//! - `Value` / `Payload`: Runtime cell values, with copy-on-write out-of-line bytes
//! - `Row` / `TupleId`: Detached row images and tuple slot addresses
//! - `Expr`: Scalar expressions for expression indexes, partial-index predicates and view filters
//! - `schema`: Schema definitions (Column, IndexDef, Table)
//! - `Error`: The constraint / evaluation / fatal error taxonomy
//!
//! # Example
//!
//! ```rust
//! use strata_core::{DataType, Value, Row};
//! use strata_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new(vec![Value::Int64(1), Value::from("Alice")]);
//!
//! assert_eq!(table.width(), row.len());
//! assert_eq!(row.get(1), Some(&Value::from("Alice")));
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod expr;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{ConstraintKind, Error, Result};
pub use expr::Expr;
pub use row::{Row, TupleId};
pub use types::DataType;
pub use value::{Payload, Value};
