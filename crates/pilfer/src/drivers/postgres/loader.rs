//! PostgreSQL bulk loader implementation.
//!
//! Each table is loaded with one CSV `COPY ... FROM STDIN` inside its own
//! transaction. Triggers and foreign key checks are suspended for that
//! transaction through `session_replication_role`, and timestamps are read
//! as UTC, matching what the readers emit.

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Object, Pool, Transaction};
use futures::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::catalog::ConnOpts;
use crate::core::traits::{BulkLoader, BytesFormat};
use crate::error::{postgres_message, PilferError, Result};

use super::dialect::PostgresDialect;
use super::pool::{self, pool_message};

/// Per-transaction settings for every table load.
pub const LOAD_SETTINGS: &str =
    "SET LOCAL session_replication_role = replica; SET LOCAL TIME ZONE 'UTC'";

/// Undo session settings left behind by applied DDL.
///
/// `pg_dump` output empties `search_path` and changes other session
/// settings; pooled connections must not keep them.
pub const RESET_SESSION: &str = "RESET ALL";

/// PostgreSQL bulk loader using the COPY protocol.
pub struct PostgresLoader {
    pool: Pool,
    dialect: PostgresDialect,
    schema: String,
}

impl PostgresLoader {
    /// Open a pool for the connection string and test it.
    pub async fn new(opts: &ConnOpts) -> Result<Self> {
        let pool = pool::connect(opts, "destination").await?;

        // Resolved before any DDL can change the search path
        let client = pool
            .get()
            .await
            .map_err(|e| PilferError::connection(pool_message(&e), "reading PostgreSQL schema"))?;
        let row = client
            .query_one("SELECT COALESCE(current_schema(), 'public')::text", &[])
            .await?;
        let schema: String = row.get(0);
        debug!("Loading into PostgreSQL schema {}", schema);

        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
            schema,
        })
    }

    /// Stream every chunk into an open COPY. Returns the bytes sent.
    async fn copy_chunks(
        &self,
        tx: &Transaction<'_>,
        table: &str,
        columns: &[String],
        mut chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<u64> {
        let copy_sql = self.dialect.copy_statement(&self.schema, table, columns);
        let sink = tx
            .copy_in(copy_sql.as_str())
            .await
            .map_err(|e| PilferError::load(table, format!("COPY init: {}", postgres_message(&e))))?;
        tokio::pin!(sink);

        let mut sent = 0u64;
        while let Some(chunk) = chunks.recv().await {
            // An Err chunk drops the sink unfinished, aborting the COPY
            let data = chunk?;
            sent += data.len() as u64;
            sink.send(data)
                .await
                .map_err(|e| {
                    PilferError::load(table, format!("COPY send: {}", postgres_message(&e)))
                })?;
        }

        sink.finish()
            .await
            .map_err(|e| {
                PilferError::load(table, format!("COPY finish: {}", postgres_message(&e)))
            })?;
        Ok(sent)
    }
}

#[async_trait]
impl BulkLoader for PostgresLoader {
    fn name(&self) -> &str {
        "postgres"
    }

    fn bytes_format(&self) -> BytesFormat {
        BytesFormat::Hex
    }

    async fn apply_structure(&self, ddl: &str) -> Result<()> {
        let client = self.pool.get().await.map_err(|e| {
            PilferError::connection(pool_message(&e), "applying PostgreSQL structure")
        })?;
        let applied = client.batch_execute(ddl).await;

        if let Err(e) = client.batch_execute(RESET_SESSION).await {
            // Never hand a connection with a foreign search path back to the pool
            warn!("Discarding connection after failed session reset - {}", postgres_message(&e));
            let _ = Object::take(client);
        }

        applied?;
        debug!("Applied {} bytes of DDL", ddl.len());
        Ok(())
    }

    async fn load_table(
        &self,
        table: &str,
        columns: &[String],
        chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| PilferError::load(table, pool_message(&e)))?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| PilferError::load(table, postgres_message(&e)))?;
        tx.batch_execute(LOAD_SETTINGS)
            .await
            .map_err(|e| PilferError::load(table, postgres_message(&e)))?;

        match self.copy_chunks(&tx, table, columns, chunks).await {
            Ok(sent) => {
                tx.commit()
                    .await
                    .map_err(|e| PilferError::load(table, postgres_message(&e)))?;
                debug!("{}: committed {} bytes", table, sent);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!("{}: rollback failed - {}", table, postgres_message(&rollback));
                }
                Err(e)
            }
        }
    }

    async fn close(&self) {
        self.pool.close();
    }
}
