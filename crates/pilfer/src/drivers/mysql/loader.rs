//! MySQL/MariaDB bulk loader implementation.
//!
//! Implements the `BulkLoader` trait with mysql_async. Each table is loaded
//! with one `LOAD DATA LOCAL INFILE` statement reading an in-process stream,
//! inside its own transaction with foreign key checks disabled.

use async_trait::async_trait;
use bytes::Bytes;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::catalog::{redact_dsn, ConnOpts};
use crate::core::traits::BulkLoader;
use crate::error::{PilferError, Result};

use super::dialect::MysqlDialect;
use super::infile::{chunk_stream, StreamRegistry};
use super::normalize_dsn;

/// Statements run on every new destination connection.
///
/// Timestamps are read as UTC, matching the source readers. The SQL mode is
/// the one `mysqldump` output runs under, so zero dates and explicit zero
/// ids load as they were read.
pub const SESSION_INIT: [&str; 3] = [
    "SET NAMES utf8mb4",
    "SET time_zone = '+00:00'",
    "SET SESSION sql_mode = 'NO_AUTO_VALUE_ON_ZERO'",
];

/// MySQL bulk loader using mysql_async.
pub struct MysqlLoader {
    pool: Pool,
    dialect: MysqlDialect,
    streams: StreamRegistry,
    timeout: Duration,
}

impl MysqlLoader {
    /// Open a pool for the connection string and test it.
    pub async fn new(opts: &ConnOpts) -> Result<Self> {
        let url = Opts::from_url(&normalize_dsn(&opts.dsn))
            .map_err(|e| PilferError::connection(e, "parsing MySQL destination DSN"))?;

        let max = opts.max_conns.max(1) as usize;
        let constraints = PoolConstraints::new(opts.idle_conns() as usize, max).ok_or_else(|| {
            PilferError::Config(format!(
                "invalid MySQL pool bounds: {} idle, {} max",
                opts.idle_conns(),
                max
            ))
        })?;
        let pool_opts = PoolOpts::new()
            .with_constraints(constraints)
            .with_abs_conn_ttl(opts.max_conn_lifetime);

        let builder = OptsBuilder::from_opts(url)
            .init(SESSION_INIT.to_vec())
            .pool_opts(pool_opts);
        let pool = Pool::new(builder);

        // Test connection
        let mut conn = tokio::time::timeout(opts.timeout, pool.get_conn())
            .await
            .map_err(|_| {
                PilferError::connection(
                    format!("timed out after {:?}", opts.timeout),
                    "creating MySQL destination pool",
                )
            })?
            .map_err(|e| PilferError::connection(e, "creating MySQL destination pool"))?;

        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| PilferError::connection(e, "testing MySQL destination connection"))?;

        drop(conn);

        info!("Connected to MySQL destination: {}", redact_dsn(&opts.dsn));

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
            streams: StreamRegistry::new(),
            timeout: opts.timeout,
        })
    }

    async fn get_conn(&self, table: &str) -> Result<Conn> {
        tokio::time::timeout(self.timeout, self.pool.get_conn())
            .await
            .map_err(|_| PilferError::load(table, "timed out waiting for a connection"))?
            .map_err(|e| PilferError::load(table, e))
    }

    /// Run the load statement inside an open transaction.
    async fn load_in_transaction(
        &self,
        conn: &mut Conn,
        table: &str,
        columns: &[String],
        chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<()> {
        let name = StreamRegistry::stream_name(table);
        let _registration = self.streams.register(&name, chunk_stream(chunks));

        let registry = self.streams.clone();
        let lookup = name.clone();
        conn.set_infile_handler(async move { Ok(registry.take(&lookup)) });

        let sql = self.dialect.load_data_statement(&name, table, columns);
        conn.query_drop(sql)
            .await
            .map_err(|e| PilferError::load(table, e))
    }
}

#[async_trait]
impl BulkLoader for MysqlLoader {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn apply_structure(&self, ddl: &str) -> Result<()> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| PilferError::connection(e, "applying MySQL structure"))?;
        conn.query_drop(ddl).await?;
        debug!("Applied {} bytes of DDL", ddl.len());
        Ok(())
    }

    async fn load_table(
        &self,
        table: &str,
        columns: &[String],
        chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<()> {
        let mut conn = self.get_conn(table).await?;

        conn.query_drop("SET foreign_key_checks = 0")
            .await
            .map_err(|e| PilferError::load(table, e))?;
        conn.query_drop("START TRANSACTION")
            .await
            .map_err(|e| PilferError::load(table, e))?;

        let result = self.load_in_transaction(&mut conn, table, columns, chunks).await;

        let end = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        let ended = conn.query_drop(end).await;
        if let Err(e) = conn.query_drop("SET foreign_key_checks = 1").await {
            warn!("{}: failed to restore foreign key checks - {}", table, e);
        }

        result?;
        ended.map_err(|e| PilferError::load(table, e))?;
        debug!("{}: load committed", table);
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error closing MySQL destination pool: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_init_reads_timestamps_as_utc() {
        assert!(SESSION_INIT.contains(&"SET time_zone = '+00:00'"));
    }

    #[test]
    fn test_session_init_allows_zero_dates() {
        let sql_mode = SESSION_INIT
            .iter()
            .find(|s| s.contains("sql_mode"))
            .unwrap();
        assert!(!sql_mode.contains("NO_ZERO_DATE"));
        assert!(!sql_mode.contains("STRICT"));
    }
}
