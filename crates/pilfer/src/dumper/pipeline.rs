//! Single-table transfer pipeline.
//!
//! Three stages run concurrently, joined by bounded channels:
//!
//! ```text
//! reader.read_table ──rows──> encoder ──chunks──> loader.load_table
//! ```
//!
//! The loader owns the table's transaction. A read failure is forwarded to it
//! as an error chunk so the transaction rolls back; an encoding failure just
//! ends the chunk stream, so rows already encoded are committed.

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::traits::{BulkLoader, ReadTableOpt, Reader};
use crate::core::value::Row;
use crate::error::{PilferError, Result};

use super::encode::RecordEncoder;
use super::report::{TableReport, TableStatus};
use super::DumpConfig;

/// Encoded chunks queued ahead of the loader.
const CHUNK_QUEUE: usize = 4;

/// One table's work item.
pub(crate) struct TableJob {
    pub table: String,
    pub opts: ReadTableOpt,
    pub reader: Arc<dyn Reader>,
    pub loader: Arc<dyn BulkLoader>,
    pub config: DumpConfig,
}

/// What the encoder stage saw.
struct EncodeOutcome {
    rows: u64,
    truncated_by: Option<PilferError>,
    read_error: Option<String>,
}

impl TableJob {
    /// Run the pipeline to completion. Never fails: the outcome is reported.
    pub(crate) async fn run(self) -> TableReport {
        let started = Instant::now();
        let table = self.table.clone();

        let columns = match self.reader.get_columns(&table).await {
            Ok(columns) => columns,
            Err(e) => {
                error!("{}: failed to list columns - {}", table, e);
                return TableReport::failed(table, e, started.elapsed());
            }
        };
        debug!("{}: loading {} columns", table, columns.len());

        let (row_tx, row_rx) = mpsc::channel::<Row>(self.config.row_buffer);
        let (chunk_tx, chunk_rx) = mpsc::channel::<Result<Bytes>>(CHUNK_QUEUE);

        let reader = self.reader.clone();
        let read_table = table.clone();
        let opts = self.opts;
        let producer: JoinHandle<Result<()>> =
            tokio::spawn(async move { reader.read_table(&read_table, row_tx, opts).await });

        let encoder = RecordEncoder::new(table.clone(), columns.clone())
            .with_bytes_format(self.loader.bytes_format());
        let encoder_handle = tokio::spawn(encode_rows(
            table.clone(),
            encoder,
            self.config.chunk_bytes,
            row_rx,
            chunk_tx,
            producer,
        ));

        let load_result = self.loader.load_table(&table, &columns, chunk_rx).await;

        let outcome = match encoder_handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: encoder task panicked - {}", table, e);
                return TableReport::failed(
                    table,
                    format!("Encoder task panicked: {}", e),
                    started.elapsed(),
                );
            }
        };

        let elapsed = started.elapsed();
        match (load_result, outcome.truncated_by) {
            (Err(e), _) => {
                let message = outcome.read_error.unwrap_or_else(|| e.to_string());
                error!("{}: failed - {}", table, message);
                TableReport::failed(table, message, elapsed)
            }
            (Ok(()), Some(e)) => {
                warn!("{}: truncated after {} rows - {}", table, outcome.rows, e);
                TableReport {
                    table,
                    status: TableStatus::Truncated,
                    rows: outcome.rows,
                    error: Some(e.to_string()),
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
            (Ok(()), None) => {
                info!("{}: completed ({} rows)", table, outcome.rows);
                TableReport {
                    table,
                    status: TableStatus::Completed,
                    rows: outcome.rows,
                    error: None,
                    duration_ms: elapsed.as_millis() as u64,
                }
            }
        }
    }
}

/// Encode rows into chunks of roughly `chunk_bytes` until the rows end.
///
/// After the row stream closes the producer is awaited; a read error is sent
/// downstream as an `Err` chunk so the load rolls back.
async fn encode_rows(
    table: String,
    mut encoder: RecordEncoder,
    chunk_bytes: usize,
    mut rows: mpsc::Receiver<Row>,
    chunks: mpsc::Sender<Result<Bytes>>,
    producer: JoinHandle<Result<()>>,
) -> EncodeOutcome {
    let mut buf = BytesMut::with_capacity(chunk_bytes);
    let mut outcome = EncodeOutcome {
        rows: 0,
        truncated_by: None,
        read_error: None,
    };
    let mut loader_gone = false;

    while let Some(row) = rows.recv().await {
        if let Err(e) = encoder.encode(&row, &mut buf) {
            outcome.truncated_by = Some(e);
            break;
        }
        outcome.rows += 1;

        if buf.len() >= chunk_bytes && chunks.send(Ok(buf.split().freeze())).await.is_err() {
            loader_gone = true;
            break;
        }
    }
    // Stop the reader if the loop ended early.
    drop(rows);

    if !loader_gone && !buf.is_empty() && chunks.send(Ok(buf.split().freeze())).await.is_err() {
        loader_gone = true;
    }

    let read_result = match producer.await {
        Ok(result) => result,
        Err(e) => Err(PilferError::read_table(&table, format!("reader task panicked: {}", e))),
    };

    if let Err(e) = read_result {
        if outcome.truncated_by.is_none() && !loader_gone {
            outcome.read_error = Some(e.to_string());
            let _ = chunks.send(Err(e)).await;
        } else {
            debug!("{}: reader ended with {} after the stream stopped", table, e);
        }
    }

    outcome
}
