//! Scalar expressions evaluated against a single row.
//!
//! Expression indexes, partial-index predicates, view filters and
//! group-by expressions are all `Expr` trees. Evaluation follows SQL
//! three-valued logic: comparisons involving NULL yield NULL, and a
//! predicate only passes when it evaluates to `TRUE`.

use crate::error::{Error, Result};
use crate::value::Value;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    IsNull,
    IsNotNull,
}

/// Expression tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Column of the row being evaluated, by position.
    Column(usize),
    /// Literal value.
    Literal(Value),
    /// Run-time statement parameter, by position.
    Param(usize),
    /// Binary operation.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
}

impl Expr {
    /// Creates a column reference expression.
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    /// Creates a literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Creates a parameter reference expression.
    pub fn param(index: usize) -> Self {
        Expr::Param(index)
    }

    fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    /// Creates a not-equal expression.
    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ne, right)
    }

    /// Creates a less-than expression.
    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Lt, right)
    }

    /// Creates a less-than-or-equal expression.
    pub fn le(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Le, right)
    }

    /// Creates a greater-than expression.
    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Gt, right)
    }

    /// Creates a greater-than-or-equal expression.
    pub fn ge(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ge, right)
    }

    /// Creates a logical AND expression.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    /// Creates a logical OR expression.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    /// Creates an addition expression.
    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Add, right)
    }

    /// Creates a subtraction expression.
    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Sub, right)
    }

    /// Creates a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NULL expression.
    pub fn is_null(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NOT NULL expression.
    pub fn is_not_null(expr: Expr) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::IsNotNull,
            expr: Box::new(expr),
        }
    }

    /// Evaluates the expression against `row`, resolving parameters from `params`.
    pub fn eval(&self, row: &[Value], params: &[Value]) -> Result<Value> {
        match self {
            Expr::Column(i) => row
                .get(*i)
                .cloned()
                .ok_or_else(|| {
                    Error::evaluation(format!(
                        "column {} out of range for row of width {}",
                        i,
                        row.len()
                    ))
                }),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Param(i) => params
                .get(*i)
                .cloned()
                .ok_or_else(|| Error::evaluation(format!("parameter {} not bound", i))),
            Expr::BinaryOp { left, op, right } => {
                let l = left.eval(row, params)?;
                let r = right.eval(row, params)?;
                eval_binary(*op, &l, &r)
            }
            Expr::UnaryOp { op, expr } => {
                let v = expr.eval(row, params)?;
                match op {
                    UnaryOp::IsNull => Ok(Value::Boolean(v.is_null())),
                    UnaryOp::IsNotNull => Ok(Value::Boolean(!v.is_null())),
                    UnaryOp::Not => match v {
                        Value::Null => Ok(Value::Null),
                        Value::Boolean(b) => Ok(Value::Boolean(!b)),
                        other => Err(Error::evaluation(format!("NOT applied to {:?}", other))),
                    },
                }
            }
        }
    }

    /// Evaluates a predicate; NULL counts as not satisfied.
    pub fn is_satisfied(&self, row: &[Value], params: &[Value]) -> Result<bool> {
        match self.eval(row, params)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(Error::evaluation(format!("predicate produced non-boolean {:?}", other))),
        }
    }

    /// Returns the columns this expression reads, in first-use order.
    pub fn referenced_columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            Expr::Column(i) => {
                if !out.contains(i) {
                    out.push(*i);
                }
            }
            Expr::Literal(_) | Expr::Param(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_columns(out),
        }
    }

    /// Returns the column index if this expression is a bare column reference.
    pub fn as_column(&self) -> Option<usize> {
        match self {
            Expr::Column(i) => Some(*i),
            _ => None,
        }
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(match (l.as_bool(), r.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        }),
        BinaryOp::Or => Ok(match (l.as_bool(), r.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        }),
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        _ if l.is_null() || r.is_null() => Ok(Value::Null),
        BinaryOp::Eq => Ok(Value::Boolean(l.cmp(r).is_eq())),
        BinaryOp::Ne => Ok(Value::Boolean(!l.cmp(r).is_eq())),
        BinaryOp::Lt => Ok(Value::Boolean(l < r)),
        BinaryOp::Le => Ok(Value::Boolean(l <= r)),
        BinaryOp::Gt => Ok(Value::Boolean(l > r)),
        BinaryOp::Ge => Ok(Value::Boolean(l >= r)),
    }
}
