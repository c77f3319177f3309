//! Value type definitions for the Strata storage engine.
//!
//! This module defines the `Value` enum which represents any value that can be stored
//! in a tuple slot, and `Payload`, the shared out-of-line byte buffer behind
//! variable-length binary columns.

use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

/// An out-of-line, reference-counted byte buffer with copy-on-write semantics.
///
/// Cloning a `Payload` shares the underlying buffer. The first mutation through
/// [`Payload::make_mut`] on a shared buffer copies it, so an undo image holding
/// the old payload is never disturbed by an update that rewrites the new one.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(Arc<Vec<u8>>);

impl Payload {
    /// Wraps an owned buffer.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }

    /// Returns the bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Returns a mutable buffer, copying it first if it is shared.
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    /// Returns true if another value still references this buffer.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    /// Returns true if both payloads point at the same buffer.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::new(v)
    }
}

/// A value that can be stored in a tuple slot.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string, shared between tuple images
    String(Arc<str>),
    /// Timestamp in microseconds since the Unix epoch
    Timestamp(i64),
    /// Binary data
    Bytes(Payload),
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
        }
    }
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::String(_) => Some(DataType::String),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Bytes(_) => Some(DataType::Bytes),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i32 value if this is an Int32, None otherwise.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to i64 if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float64, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the bytes if this is Bytes, None otherwise.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns true if the value is an instance of `dt` (Null matches every type).
    pub fn conforms_to(&self, dt: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(own) => own == dt,
        }
    }

    /// Adds two numeric values. Null on either side yields Null.
    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        self.arith(other, ArithOp::Add)
    }

    /// Subtracts `other` from this value. Null on either side yields Null.
    pub fn checked_sub(&self, other: &Value) -> Result<Value> {
        self.arith(other, ArithOp::Sub)
    }

    fn arith(&self, other: &Value, op: ArithOp) -> Result<Value> {
        let overflow = || {
            Error::evaluation(format!(
                "numeric overflow in {:?} {} {:?}",
                self,
                op.symbol(),
                other
            ))
        };
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int32(a), Value::Int32(b)) => {
                let r = match op {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                };
                r.map(Value::Int32).ok_or_else(overflow)
            }
            (Value::Float64(a), b) | (b, Value::Float64(a)) if b.is_numeric() => {
                let bf = match b {
                    Value::Float64(f) => *f,
                    _ => b.as_i64().unwrap_or_default() as f64,
                };
                // Subtraction is not commutative; recover operand order.
                let (l, r) = if matches!(self, Value::Float64(_)) { (*a, bf) } else { (bf, *a) };
                Ok(Value::Float64(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                }))
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => {
                    let r = match op {
                        ArithOp::Add => a.checked_add(b),
                        ArithOp::Sub => a.checked_sub(b),
                    };
                    r.map(Value::Int64).ok_or_else(overflow)
                }
                _ => Err(Error::evaluation(format!(
                    "cannot apply {} to {:?} and {:?}",
                    op.symbol(),
                    a.data_type(),
                    b.data_type()
                ))),
            },
        }
    }

    fn is_numeric(&self) -> bool {
        self.data_type().map(|t| t.is_numeric()).unwrap_or(false)
    }

    /// Appends a canonical byte encoding of this value to `out`.
    ///
    /// Integers of either width encode identically so that equal keys route to
    /// the same partition regardless of the column width they came from.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(0),
            Value::Boolean(b) => {
                out.push(DataType::Boolean.tag());
                out.push(*b as u8);
            }
            Value::Int32(_) | Value::Int64(_) => {
                out.push(DataType::Int64.tag());
                out.extend_from_slice(&self.as_i64().unwrap_or_default().to_le_bytes());
            }
            Value::Float64(f) => {
                out.push(DataType::Float64.tag());
                out.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Value::String(s) => {
                out.push(DataType::String.tag());
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Timestamp(t) => {
                out.push(DataType::Timestamp.tag());
                out.extend_from_slice(&t.to_le_bytes());
            }
            Value::Bytes(p) => {
                out.push(DataType::Bytes.tag());
                out.extend_from_slice(&(p.len() as u32).to_le_bytes());
                out.extend_from_slice(p.as_slice());
            }
        }
    }

    /// Hash used to route a partitioning-column value to its partition.
    pub fn partition_hash(&self) -> u64 {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        xxhash_rust::xxh3::xxh3_64(&buf)
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) => 2,
            Value::Int64(_) => 3,
            Value::Float64(_) => 4,
            Value::String(_) => 5,
            Value::Timestamp(_) => 6,
            Value::Bytes(_) => 7,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Timestamp(d) => d.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            // Cross-type numeric comparisons
            (Value::Int32(a), Value::Int64(b)) => (*a as i64).cmp(b),
            (Value::Int64(a), Value::Int32(b)) => a.cmp(&(*b as i64)),
            (Value::Int32(_) | Value::Int64(_), Value::Float64(b)) => {
                let a = self.as_i64().unwrap_or_default() as f64;
                if b.is_nan() {
                    Ordering::Less
                } else {
                    a.partial_cmp(b).unwrap_or(Ordering::Equal)
                }
            }
            (Value::Float64(a), Value::Int32(_) | Value::Int64(_)) => {
                let b = other.as_i64().unwrap_or_default() as f64;
                if a.is_nan() {
                    Ordering::Greater
                } else {
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                }
            }
            (Value::Float64(a), Value::Float64(b)) => {
                // NaN sorts above every other float
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Payload::new(v))
    }
}

impl From<Payload> for Value {
    fn from(v: Payload) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
