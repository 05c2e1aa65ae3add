//! Core traits for database-agnostic cloning.
//!
//! This module defines the primary abstractions used by the dump engine:
//!
//! - [`Reader`]: Lists tables and columns, produces DDL, streams rows
//! - [`BulkLoader`]: Applies DDL and bulk-loads one table per transaction
//! - [`Dialect`]: SQL syntax strategy for different database engines
//!
//! The anonymiser is itself a [`Reader`] that wraps another one, so the
//! dump engine never knows whether rows are being rewritten.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

use super::value::Row;

/// Resolved options for reading one table.
///
/// Built from the table's configuration at dump time. An empty value (no
/// limit, no relationships) reads the whole table in engine order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadTableOpt {
    /// Maximum number of rows to read. Zero means unlimited.
    pub limit: u64,

    /// Foreign-key constraints restricting which rows are read.
    pub relationships: Vec<RelationshipOpt>,
}

impl ReadTableOpt {
    /// Options that read the whole table.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Options that only apply a row limit.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit,
            relationships: Vec::new(),
        }
    }

    /// True when these options would read the table unrestricted.
    pub fn is_empty(&self) -> bool {
        self.limit == 0 && self.relationships.is_empty()
    }

    /// Every table whose sample is referenced, directly or transitively.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for rel in &self.relationships {
            out.push(rel.referenced_table.as_str());
            out.extend(rel.referenced.referenced_tables());
        }
        out
    }
}

/// A resolved relationship constraint.
///
/// Rows of the owning table are kept only when `foreign_key` matches a
/// `referenced_key` value of the referenced table's effective sample, which
/// is described by `referenced`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipOpt {
    /// Table holding the referenced keys.
    pub referenced_table: String,

    /// Column of the referenced table.
    pub referenced_key: String,

    /// Column of the owning table.
    pub foreign_key: String,

    /// Read options of the referenced table.
    pub referenced: ReadTableOpt,
}

/// Read schema and rows from a source database.
///
/// # Streaming
///
/// [`Reader::read_table`] takes ownership of the sending half of a bounded
/// channel. The sender is dropped, closing the channel, exactly once when the
/// call returns. If the receiving side is dropped early the reader stops
/// without error.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Base tables of the source, ordered by name. Views are excluded.
    async fn get_tables(&self) -> Result<Vec<String>>;

    /// Columns of a table in schema order.
    ///
    /// Fails with `SchemaLookup` when the table does not exist.
    async fn get_columns(&self, table: &str) -> Result<Vec<String>>;

    /// DDL text recreating every base table.
    async fn get_structure(&self) -> Result<String>;

    /// Stream matching rows of `table` into `sink`.
    ///
    /// Returns an error only for query or connection failures. Values the
    /// reader cannot decode are emitted as `Value::Unsupported`.
    async fn read_table(
        &self,
        table: &str,
        sink: mpsc::Sender<Row>,
        opts: ReadTableOpt,
    ) -> Result<()>;

    /// Release pooled connections.
    async fn close(&self) {}
}

/// How binary values are written into a bulk-load record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BytesFormat {
    /// Bytes are copied into the quoted field unchanged.
    #[default]
    Raw,
    /// Bytes are written as `\x` followed by lowercase hex digits.
    Hex,
}

/// Write structure and bulk data to a destination database.
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// Driver name (e.g. "mysql").
    fn name(&self) -> &str;

    /// Encoding the loader expects for binary values.
    fn bytes_format(&self) -> BytesFormat {
        BytesFormat::Raw
    }

    /// Execute DDL text produced by a [`Reader`].
    async fn apply_structure(&self, ddl: &str) -> Result<()>;

    /// Load one table inside its own transaction.
    ///
    /// `chunks` yields encoded record bytes in destination column order. An
    /// `Err` item aborts the load and rolls the transaction back. The load
    /// commits once the channel closes cleanly.
    async fn load_table(
        &self,
        table: &str,
        columns: &[String],
        chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<()>;

    /// Release pooled connections.
    async fn close(&self) {}
}

/// SQL syntax strategy for a database engine.
pub trait Dialect: Send + Sync {
    /// Dialect name (e.g. "mysql", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table or column name).
    fn quote_ident(&self, name: &str) -> String;

    /// Quote and join a list of column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
