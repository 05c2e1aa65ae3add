//! Row to bulk-load record encoding.
//!
//! Records are comma-separated with every field enclosed in double quotes
//! and embedded quotes doubled, one record per line. NULL is written as the
//! bare unquoted token `NULL` so both `LOAD DATA ... ENCLOSED BY '"'` and
//! `COPY ... (FORMAT csv, NULL 'NULL')` read a real NULL while the quoted
//! string `"NULL"` stays a string.
//!
//! Binary values follow the loader's [`BytesFormat`].

use bytes::{BufMut, BytesMut};

use crate::core::traits::BytesFormat;
use crate::core::value::{Row, Value};
use crate::error::{PilferError, Result};

/// Timestamp layout understood by both MySQL and PostgreSQL.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Unquoted NULL marker.
pub const NULL_TOKEN: &[u8] = b"NULL";

/// Encodes rows of one table in destination column order.
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    table: String,
    columns: Vec<String>,
    bytes_format: BytesFormat,
    scratch: Vec<u8>,
}

impl RecordEncoder {
    /// Create an encoder for a table's column order.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            bytes_format: BytesFormat::Raw,
            scratch: Vec::with_capacity(256),
        }
    }

    /// Write binary values in the given format.
    pub fn with_bytes_format(mut self, bytes_format: BytesFormat) -> Self {
        self.bytes_format = bytes_format;
        self
    }

    /// Append one record to `buf`.
    ///
    /// On error nothing is appended, so `buf` always ends on a complete
    /// record.
    pub fn encode(&mut self, row: &Row, buf: &mut BytesMut) -> Result<()> {
        self.scratch.clear();

        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                self.scratch.push(b',');
            }
            let value = row.get(column).ok_or_else(|| {
                PilferError::encoding(&self.table, column, "column missing from row")
            })?;
            write_field(&mut self.scratch, value, self.bytes_format)
                .map_err(|message| PilferError::encoding(&self.table, column, message))?;
        }
        self.scratch.push(b'\n');

        buf.put_slice(&self.scratch);
        Ok(())
    }
}

fn write_field(
    out: &mut Vec<u8>,
    value: &Value,
    bytes_format: BytesFormat,
) -> std::result::Result<(), String> {
    match value {
        Value::Null => out.extend_from_slice(NULL_TOKEN),
        Value::Int(v) => write_quoted(out, v.to_string().as_bytes()),
        Value::Float(v) => write_quoted(out, v.to_string().as_bytes()),
        Value::Bool(v) => write_quoted(out, if *v { "true" } else { "false" }.as_bytes()),
        Value::Text(v) => write_quoted(out, v.as_bytes()),
        Value::Bytes(v) => match bytes_format {
            BytesFormat::Raw => write_quoted(out, v),
            BytesFormat::Hex => {
                // hex digits never need quote escaping
                out.extend_from_slice(b"\"\\x");
                out.extend_from_slice(hex::encode(v).as_bytes());
                out.push(b'"');
            }
        },
        Value::Timestamp(v) => {
            write_quoted(out, v.format(TIMESTAMP_FORMAT).to_string().as_bytes())
        }
        Value::Unsupported { type_name } => {
            return Err(format!("unsupported value type {}", type_name));
        }
    }
    Ok(())
}

fn write_quoted(out: &mut Vec<u8>, raw: &[u8]) {
    out.push(b'"');
    for &b in raw {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}
