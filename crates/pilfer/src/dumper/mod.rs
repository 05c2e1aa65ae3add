//! Dump engine - structure first, then one pipeline per table.

mod encode;
mod pipeline;
mod report;

pub use encode::{RecordEncoder, NULL_TOKEN, TIMESTAMP_FORMAT};
pub use report::{DumpReport, TableReport, TableStatus};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::{DumpSettings, Tables};
use crate::core::traits::{BulkLoader, Reader};
use crate::error::{PilferError, Result};

use pipeline::TableJob;

/// Dump engine tuning.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Tables loaded at the same time.
    pub concurrency: usize,

    /// Rows buffered between reader and encoder.
    pub row_buffer: usize,

    /// Target size of one encoded chunk in bytes.
    pub chunk_bytes: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        DumpSettings::default().into()
    }
}

impl From<DumpSettings> for DumpConfig {
    fn from(settings: DumpSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            row_buffer: settings.row_buffer.max(1),
            chunk_bytes: settings.chunk_bytes.max(1),
        }
    }
}

/// Copies every source table into the destination.
pub struct DumpEngine {
    reader: Arc<dyn Reader>,
    loader: Arc<dyn BulkLoader>,
    config: DumpConfig,
}

impl DumpEngine {
    /// Create an engine over a reader (optionally anonymising) and a loader.
    pub fn new(reader: Arc<dyn Reader>, loader: Arc<dyn BulkLoader>, config: DumpConfig) -> Self {
        Self {
            reader,
            loader,
            config,
        }
    }

    /// Apply the source structure, then launch one pipeline per table.
    ///
    /// Returns once the structure is applied and every pipeline is queued.
    /// Only structure and table listing failures are returned here; table
    /// failures are isolated and reported through `done`, which receives the
    /// [`DumpReport`] exactly once after the last pipeline finished.
    pub async fn dump(&self, done: oneshot::Sender<DumpReport>, tables: &Tables) -> Result<()> {
        let mut report = DumpReport::begin();

        let structure = self.reader.get_structure().await?;
        self.loader
            .apply_structure(&structure)
            .await
            .map_err(|e| PilferError::StructureApply(e.to_string()))?;
        info!("Applied source structure to {} destination", self.loader.name());

        let names = self.reader.get_tables().await?;
        let known: HashSet<String> = names.iter().cloned().collect();

        let mut jobs = Vec::with_capacity(names.len());
        for table in names {
            match tables.read_options(&table, &known) {
                Ok(opts) => jobs.push(TableJob {
                    table,
                    opts,
                    reader: self.reader.clone(),
                    loader: self.loader.clone(),
                    config: self.config.clone(),
                }),
                Err(e) => {
                    warn!("{}: skipped - {}", table, e);
                    report.push(TableReport::skipped(table, e));
                }
            }
        }

        info!(
            "Dumping {} tables with {} workers",
            jobs.len(),
            self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        tokio::spawn(async move {
            let mut handles = Vec::with_capacity(jobs.len());

            for job in jobs {
                let table = job.table.clone();
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        report.push(TableReport::skipped(table, e));
                        continue;
                    }
                };
                let handle = tokio::spawn(async move {
                    let result = job.run().await;
                    drop(permit);
                    result
                });
                handles.push((table, handle));
            }

            for (table, handle) in handles {
                match handle.await {
                    Ok(table_report) => report.push(table_report),
                    Err(e) => {
                        error!("{}: task panicked - {}", table, e);
                        report.push(TableReport::failed(
                            table,
                            format!("Task panicked: {}", e),
                            Duration::ZERO,
                        ));
                    }
                }
            }

            report.finish();
            debug!(
                "Dump {} finished: {}/{} tables complete",
                report.run_id,
                report.tables_completed(),
                report.tables.len()
            );
            if done.send(report).is_err() {
                debug!("Dump completion receiver dropped");
            }
        });

        Ok(())
    }

    /// Close both ends.
    pub async fn close(&self) {
        self.reader.close().await;
        self.loader.close().await;
    }
}
