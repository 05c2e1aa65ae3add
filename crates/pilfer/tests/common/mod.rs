//! In-memory reader and recording loader shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use pilfer::error::{PilferError, Result};
use pilfer::{BulkLoader, BytesFormat, ReadTableOpt, Reader, Row, Value};
use tokio::sync::mpsc;

/// One table held by [`MemoryReader`].
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Fail with a read error after this many rows.
    pub fail_after: Option<usize>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            fail_after: None,
        }
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        let row = self.columns.iter().cloned().zip(values).collect();
        self.rows.push(row);
        self
    }

    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

/// Reader over tables kept in memory.
#[derive(Default)]
pub struct MemoryReader {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str, table: MemoryTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }
}

#[async_trait]
impl Reader for MemoryReader {
    async fn get_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        self.tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| PilferError::schema_lookup(table))
    }

    async fn get_structure(&self) -> Result<String> {
        Ok(self
            .tables
            .keys()
            .map(|name| format!("CREATE TABLE {} ();\n", name))
            .collect())
    }

    async fn read_table(&self, table: &str, sink: mpsc::Sender<Row>, opts: ReadTableOpt) -> Result<()> {
        let data = self
            .tables
            .get(table)
            .ok_or_else(|| PilferError::schema_lookup(table))?;

        let limit = if opts.limit == 0 {
            usize::MAX
        } else {
            opts.limit as usize
        };
        for (i, row) in data.rows.iter().take(limit).enumerate() {
            if data.fail_after == Some(i) {
                return Err(PilferError::read_table(table, "connection reset by peer"));
            }
            if sink.send(row.clone()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Loader recording applied structure and committed table contents.
#[derive(Default)]
pub struct RecordingLoader {
    pub fail_structure: bool,
    pub bytes_format: BytesFormat,
    pub structure: Mutex<Vec<String>>,
    pub committed: Mutex<HashMap<String, String>>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_structure() -> Self {
        Self {
            fail_structure: true,
            ..Self::default()
        }
    }

    pub fn with_bytes_format(bytes_format: BytesFormat) -> Self {
        Self {
            bytes_format,
            ..Self::default()
        }
    }

    /// Committed records of a table, one line per row.
    pub fn lines(&self, table: &str) -> Option<Vec<String>> {
        self.committed
            .lock()
            .unwrap()
            .get(table)
            .map(|text| text.lines().map(str::to_string).collect())
    }
}

#[async_trait]
impl BulkLoader for RecordingLoader {
    fn name(&self) -> &str {
        "recording"
    }

    fn bytes_format(&self) -> BytesFormat {
        self.bytes_format
    }

    async fn apply_structure(&self, ddl: &str) -> Result<()> {
        if self.fail_structure {
            return Err(PilferError::connection("syntax error at or near CREATE", "applying structure"));
        }
        self.structure.lock().unwrap().push(ddl.to_string());
        Ok(())
    }

    async fn load_table(
        &self,
        table: &str,
        _columns: &[String],
        mut chunks: mpsc::Receiver<Result<Bytes>>,
    ) -> Result<()> {
        let mut data = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            // Rolled back: nothing is recorded
            data.extend_from_slice(&chunk?);
        }
        self.committed
            .lock()
            .unwrap()
            .insert(table.to_string(), String::from_utf8_lossy(&data).into_owned());
        Ok(())
    }
}
