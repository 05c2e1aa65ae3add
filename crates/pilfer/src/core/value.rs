//! Row value types shared by readers, the anonymiser and the dumper.
//!
//! Rows are keyed by column name rather than position: a reader emits the
//! full column set of a table, the anonymiser rewrites entries by name, and
//! the dumper re-orders them into destination column order while encoding.

use std::collections::HashMap;

use chrono::NaiveDateTime;

/// A single column value read from a source database.
///
/// The set is closed. Fixed-point decimals, dates, times, UUIDs and JSON are
/// carried as [`Value::Text`] in their canonical textual form, which is what
/// a bulk load expects anyway.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,

    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating point.
    Float(f64),

    /// Boolean value.
    Bool(bool),

    /// UTF-8 text.
    Text(String),

    /// Raw bytes.
    Bytes(Vec<u8>),

    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),

    /// A source value the reader could not decode.
    ///
    /// Carried through the pipeline so the failure surfaces at encoding time
    /// for the table it belongs to.
    Unsupported {
        /// Engine type name as reported by the driver.
        type_name: String,
    },
}

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Create an unsupported marker for an engine type name.
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Value::Unsupported {
            type_name: type_name.into(),
        }
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One source row: column name to value.
pub type Row = HashMap<String, Value>;
