//! Error types for the Strata storage engine.
//!
//! Three families matter to callers of the mutation protocol:
//!
//! - [`Error::ConstraintViolation`]: the row was rejected and the table is unchanged.
//! - [`Error::Evaluation`]: an expression inside a predicate or aggregate failed.
//! - [`Error::Fatal`]: bookkeeping found an impossible state. The enclosing
//!   unit of work must be abandoned, never retried.

use crate::row::Row;
use crate::types::DataType;
use alloc::string::String;
use core::fmt;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The constraint a rejected row violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    Partitioning,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::NotNull => f.write_str("NOT NULL"),
            ConstraintKind::Unique => f.write_str("UNIQUE"),
            ConstraintKind::Partitioning => f.write_str("PARTITIONING"),
        }
    }
}

/// Error types for Strata operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A row failed a NOT NULL, UNIQUE or PARTITIONING check.
    ///
    /// `constraint` names the column (NOT NULL, PARTITIONING) or index (UNIQUE).
    #[error("{kind} constraint violation on {table}.{constraint}")]
    ConstraintViolation {
        kind: ConstraintKind,
        table: String,
        constraint: String,
        row: Row,
        conflicting: Option<Row>,
    },

    /// Index, undo or view bookkeeping reached a state that cannot happen.
    #[error("fatal internal error: {message}")]
    Fatal { message: String },

    /// Expression evaluation failed.
    #[error("evaluation error{}: {message}", column_suffix(.column))]
    Evaluation {
        column: Option<String>,
        message: String,
    },

    #[error("type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: DataType, got: DataType },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("table not found: {name}")]
    TableNotFound { name: String },

    #[error("view not found: {name}")]
    ViewNotFound { name: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

fn column_suffix(column: &Option<String>) -> String {
    match column {
        Some(c) => alloc::format!(" on column {c}"),
        None => String::new(),
    }
}

impl Error {
    /// Creates a NOT NULL violation.
    pub fn not_null(table: impl Into<String>, column: impl Into<String>, row: Row) -> Self {
        Error::ConstraintViolation {
            kind: ConstraintKind::NotNull,
            table: table.into(),
            constraint: column.into(),
            row,
            conflicting: None,
        }
    }

    /// Creates a UNIQUE violation carrying the row that already owns the key.
    pub fn unique(
        table: impl Into<String>,
        index: impl Into<String>,
        row: Row,
        conflicting: Option<Row>,
    ) -> Self {
        Error::ConstraintViolation {
            kind: ConstraintKind::Unique,
            table: table.into(),
            constraint: index.into(),
            row,
            conflicting,
        }
    }

    /// Creates a PARTITIONING violation.
    pub fn partitioning(table: impl Into<String>, column: impl Into<String>, row: Row) -> Self {
        Error::ConstraintViolation {
            kind: ConstraintKind::Partitioning,
            table: table.into(),
            constraint: column.into(),
            row,
            conflicting: None,
        }
    }

    /// Creates a fatal internal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Error::Fatal {
            message: message.into(),
        }
    }

    /// Creates an evaluation error with no column attached yet.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation {
            column: None,
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a view not found error.
    pub fn view_not_found(name: impl Into<String>) -> Self {
        Error::ViewNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Attaches a column name to an evaluation error that has none.
    pub fn with_column(self, name: &str) -> Self {
        match self {
            Error::Evaluation {
                column: None,
                message,
            } => Error::Evaluation {
                column: Some(name.into()),
                message,
            },
            other => other,
        }
    }

    /// Returns true for errors that mean internal state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }

    /// Returns true for errors the executor turns into a statement failure.
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns the violated constraint, if this is a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Error::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch(DataType::Int32, DataType::String);
        assert!(err.to_string().contains("type mismatch"));

        let err = Error::not_null("users", "name", Row::new(vec![Value::Null]));
        assert_eq!(err.to_string(), "NOT NULL constraint violation on users.name");

        let err = Error::table_not_found("users");
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn test_unique_carries_conflicting_row() {
        let existing = Row::new(vec![Value::Int64(1)]);
        let err = Error::unique(
            "t",
            "idx_a",
            Row::new(vec![Value::Int64(1)]),
            Some(existing.clone()),
        );
        match err {
            Error::ConstraintViolation { kind, conflicting, .. } => {
                assert_eq!(kind, ConstraintKind::Unique);
                assert_eq!(conflicting, Some(existing));
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_with_column() {
        let err = Error::evaluation("overflow").with_column("total");
        assert_eq!(err.to_string(), "evaluation error on column total: overflow");

        // An already attributed error keeps its column.
        let err = err.with_column("other");
        assert!(err.to_string().contains("total"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::fatal("index entry missing").is_fatal());
        assert!(!Error::fatal("x").is_recoverable());
        assert!(Error::evaluation("x").is_recoverable());
        assert_eq!(
            Error::partitioning("t", "a", Row::default()).constraint_kind(),
            Some(ConstraintKind::Partitioning)
        );
    }
}
