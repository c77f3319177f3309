//! Data type definitions for the Strata storage engine.
//!
//! This module defines the column types a row store can hold.

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string, stored out of line
    String,
    /// Timestamp in microseconds since the Unix epoch
    Timestamp,
    /// Binary data, stored out of line
    Bytes,
}

impl DataType {
    /// Stable one-byte tag used when hashing schemas and values.
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 => 2,
            DataType::Int64 => 3,
            DataType::Float64 => 4,
            DataType::String => 5,
            DataType::Timestamp => 6,
            DataType::Bytes => 7,
        }
    }

    /// Returns whether values of this type live outside the fixed tuple layout.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, DataType::String | DataType::Bytes)
    }

    /// Returns whether this type supports SUM.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_equality() {
        assert_eq!(DataType::Int32, DataType::Int32);
        assert_ne!(DataType::Int32, DataType::Int64);
    }

    #[test]
    fn test_tags_are_distinct() {
        let all = [
            DataType::Boolean,
            DataType::Int32,
            DataType::Int64,
            DataType::Float64,
            DataType::String,
            DataType::Timestamp,
            DataType::Bytes,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.tag(), b.tag());
            }
        }
    }

    #[test]
    fn test_variable_length() {
        assert!(DataType::String.is_variable_length());
        assert!(DataType::Bytes.is_variable_length());
        assert!(!DataType::Int64.is_variable_length());
    }

    #[test]
    fn test_numeric() {
        assert!(DataType::Int32.is_numeric());
        assert!(DataType::Float64.is_numeric());
        assert!(!DataType::String.is_numeric());
        assert!(!DataType::Timestamp.is_numeric());
    }
}
