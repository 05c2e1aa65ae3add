//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `Reader` trait over a SQLx pool. Rows are streamed with
//! `fetch` rather than buffered, so arbitrarily large tables are read with
//! bounded memory. Table reads use the text protocol, so a value the typed
//! decoders reject (zero dates, TIME beyond 24 hours) is still available as
//! the server rendered it.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::catalog::{redact_dsn, ConnOpts};
use crate::core::traits::{Dialect, ReadTableOpt, Reader};
use crate::core::value::{Row as ValueRow, Value};
use crate::dialect::{build_subset_query, OrderKeys};
use crate::drivers::structure_header;
use crate::error::{PilferError, Result};

use super::dialect::MysqlDialect;
use super::normalize_dsn;

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    dialect: MysqlDialect,
}

impl MysqlReader {
    /// Open a pool for the connection string and test it.
    pub async fn new(opts: &ConnOpts) -> Result<Self> {
        let mut pool_opts = MySqlPoolOptions::new()
            .max_connections(opts.max_conns)
            .min_connections(opts.idle_conns())
            .acquire_timeout(opts.timeout);
        if let Some(lifetime) = opts.max_conn_lifetime {
            pool_opts = pool_opts.max_lifetime(lifetime);
        }

        let pool = pool_opts
            .connect(&normalize_dsn(&opts.dsn))
            .await
            .map_err(|e| PilferError::connection(e, "creating MySQL source pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| PilferError::connection(e, "testing MySQL source connection"))?;

        info!("Connected to MySQL source: {}", redact_dsn(&opts.dsn));

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    /// Primary key columns of a table, in key order.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("COLUMN_NAME")).collect())
    }

    /// Ordering used for every limited table in the read tree.
    ///
    /// Tables are ordered by primary key, or by all columns when they have none,
    /// so repeated runs pick the same sample.
    async fn order_keys(&self, table: &str, opts: &ReadTableOpt) -> Result<OrderKeys> {
        let mut keys = OrderKeys::new();
        let mut pending: Vec<(&str, &ReadTableOpt)> = vec![(table, opts)];
        let mut seen = HashSet::new();

        while let Some((name, opts)) = pending.pop() {
            for rel in &opts.relationships {
                pending.push((rel.referenced_table.as_str(), &rel.referenced));
            }
            if opts.limit == 0 || !seen.insert(name.to_string()) {
                continue;
            }
            let mut order = self.primary_key(name).await?;
            if order.is_empty() {
                order = self.get_columns(name).await?;
            }
            keys.insert(name.to_string(), order);
        }

        Ok(keys)
    }

    /// Decode one column of a row by its reported type.
    fn decode(row: &MySqlRow, idx: usize) -> Value {
        let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return Value::Null;
        }

        let type_name = row.columns()[idx].type_info().name().to_uppercase();
        let decoded = match type_name.as_str() {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                row.try_get::<i64, _>(idx).map(Value::Int).ok()
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" | "BIT" => row.try_get::<u64, _>(idx).ok().map(|v| {
                i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Int)
            }),
            "FLOAT" | "DOUBLE" => row.try_get::<f64, _>(idx).map(Value::Float).ok(),
            "DECIMAL" => row
                .try_get::<rust_decimal::Decimal, _>(idx)
                .map(|d| Value::Text(d.to_string()))
                .ok(),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(idx)
                .map(|d| Value::Text(d.to_string()))
                .ok(),
            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(idx)
                .map(|t| Value::Text(t.to_string()))
                .ok(),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<chrono::NaiveDateTime, _>(idx)
                .map(Value::Timestamp)
                .ok(),
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" | "JSON" => row.try_get::<String, _>(idx).map(Value::Text).ok(),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes).ok()
            }
            _ => row
                .try_get::<String, _>(idx)
                .map(Value::Text)
                .or_else(|_| row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes))
                .ok(),
        };

        decoded
            .or_else(|| Self::raw_text(row, idx))
            .unwrap_or_else(|| Value::unsupported(type_name))
    }

    /// The value as the server sent it over the text protocol.
    fn raw_text(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get_unchecked::<String, _>(idx).map(Value::Text).ok()
    }

    /// Convert a MySQL row into a column-keyed row.
    fn row_to_values(row: &MySqlRow) -> ValueRow {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, col)| (col.name().to_string(), Self::decode(row, i)))
            .collect()
    }
}

#[async_trait]
impl Reader for MysqlReader {
    async fn get_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query).fetch_all(&self.pool).await?;
        let tables: Vec<String> = rows.iter().map(|r| r.get("TABLE_NAME")).collect();
        debug!("Found {} MySQL tables", tables.len());
        Ok(tables)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(PilferError::schema_lookup(table));
        }
        Ok(rows.iter().map(|r| r.get("COLUMN_NAME")).collect())
    }

    async fn get_structure(&self) -> Result<String> {
        let row: MySqlRow = sqlx::query(
            "SELECT CAST(@@hostname AS CHAR(255)) AS host, \
             CAST(DATABASE() AS CHAR(255)) AS db",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PilferError::connection(e, "reading MySQL server identity"))?;
        let host: String = row.try_get("host").unwrap_or_default();
        let database: Option<String> = row.try_get("db").unwrap_or_default();

        let mut ddl = structure_header(&host, database.as_deref().unwrap_or(""), Utc::now());
        ddl.push_str("SET FOREIGN_KEY_CHECKS=0;\n");

        for table in self.get_tables().await? {
            let sql = format!("SHOW CREATE TABLE {}", self.dialect.quote_ident(&table));
            let row: MySqlRow = sqlx::query(&sql).fetch_one(&self.pool).await?;
            let create = match row.try_get::<String, _>(1) {
                Ok(create) => create,
                Err(_) => String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(1)?).into_owned(),
            };
            ddl.push_str(&create);
            ddl.push_str(";\n\n");
        }

        ddl.push_str("SET FOREIGN_KEY_CHECKS=1;\n");
        Ok(ddl)
    }

    async fn read_table(
        &self,
        table: &str,
        sink: mpsc::Sender<ValueRow>,
        opts: ReadTableOpt,
    ) -> Result<()> {
        let order_keys = self.order_keys(table, &opts).await?;
        let sql = build_subset_query(&self.dialect, table, &opts, &order_keys);
        debug!("{}: {}", table, sql);

        // A bare string runs over the text protocol
        let mut rows = self.pool.fetch(sql.as_str());
        loop {
            let row = match rows.try_next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(PilferError::read_table(table, e)),
            };
            if sink.send(Self::row_to_values(&row)).await.is_err() {
                debug!("{}: row receiver closed, stopping read", table);
                break;
            }
        }

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
