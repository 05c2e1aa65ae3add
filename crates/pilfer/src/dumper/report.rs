//! Outcome of a dump run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Final state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Every row was loaded and committed.
    Completed,
    /// An encoding error cut the stream short; rows before it were committed.
    Truncated,
    /// The load was rolled back or never started.
    Failed,
    /// Read options could not be resolved; the table was not attempted.
    Skipped,
}

/// Result of one table pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,

    /// Final status.
    pub status: TableStatus,

    /// Rows committed to the destination.
    pub rows: u64,

    /// Error text for non-completed tables.
    pub error: Option<String>,

    /// Wall time spent on the table in milliseconds.
    pub duration_ms: u64,
}

impl TableReport {
    /// A table that was skipped before its pipeline started.
    pub fn skipped(table: impl Into<String>, error: impl ToString) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Skipped,
            rows: 0,
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    /// A table whose pipeline failed.
    pub fn failed(table: impl Into<String>, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Failed,
            rows: 0,
            error: Some(error.to_string()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// True when the table landed in full.
    pub fn is_complete(&self) -> bool {
        self.status == TableStatus::Completed
    }
}

/// Result of a dump run, delivered on the completion signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the dump started.
    pub started_at: DateTime<Utc>,

    /// When the last table finished.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table results, ordered by table name.
    pub tables: Vec<TableReport>,
}

impl DumpReport {
    /// Start a report for a run beginning now.
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            tables: Vec::new(),
        }
    }

    /// Record one table.
    pub fn push(&mut self, table: TableReport) {
        self.tables.push(table);
    }

    /// Close the report.
    pub fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.tables.sort_by(|a, b| a.table.cmp(&b.table));
    }

    /// Report for a table by name.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Rows committed across all tables.
    pub fn rows_total(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Tables loaded in full.
    pub fn tables_completed(&self) -> usize {
        self.tables.iter().filter(|t| t.is_complete()).count()
    }

    /// Tables that did not load in full.
    pub fn incomplete_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.is_complete())
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(table: &str, rows: u64) -> TableReport {
        TableReport {
            table: table.to_string(),
            status: TableStatus::Completed,
            rows,
            error: None,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_aggregates() {
        let mut report = DumpReport::begin();
        report.push(completed("users", 3));
        report.push(TableReport::skipped("orders", "unknown table"));
        report.push(completed("accounts", 7));
        report.finish();

        assert_eq!(report.rows_total(), 10);
        assert_eq!(report.tables_completed(), 2);
        assert_eq!(report.incomplete_tables(), vec!["orders"]);
        assert_eq!(report.tables[0].table, "accounts");
    }

    #[test]
    fn test_json_uses_snake_case_status() {
        let mut report = DumpReport::begin();
        report.push(TableReport::failed("t", "boom", Duration::from_millis(5)));
        report.finish();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"failed\""));
        assert!(json.contains("\"duration_ms\": 5"));
    }
}
