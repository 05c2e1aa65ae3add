//! Column anonymisation as a [`Reader`] decorator.
//!
//! [`Anonymiser`] forwards schema calls to the wrapped reader unchanged. For
//! `read_table` it interposes a relay between the wrapped reader and the
//! caller's sink whenever the table has anonymisation rules, rewriting the
//! configured columns of every row in flight.

mod generators;

pub use generators::{GeneratorFn, Generators};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{GeneratorSpec, Tables};
use crate::core::traits::{ReadTableOpt, Reader};
use crate::core::value::{Row, Value};
use crate::error::{PilferError, Result};

/// Rows buffered between the wrapped reader and the relay.
const RELAY_BUFFER: usize = 256;

/// A compiled rewrite rule for one column.
#[derive(Debug, Clone)]
enum Rule {
    Literal(String),
    Generate(GeneratorFn),
}

/// Reader decorator that rewrites configured columns.
///
/// The first table without configuration is reported as a warning; later
/// ones are logged at debug level.
pub struct Anonymiser {
    inner: Arc<dyn Reader>,
    tables: Tables,
    generators: Arc<Generators>,
    warned_unconfigured: AtomicBool,
}

impl Anonymiser {
    /// Wrap a reader with the given table rules and generator registry.
    pub fn new(inner: Arc<dyn Reader>, tables: Tables, generators: Arc<Generators>) -> Self {
        Self {
            inner,
            tables,
            generators,
            warned_unconfigured: AtomicBool::new(false),
        }
    }

    /// Log a table without configuration. Returns true if this was the
    /// warning.
    fn note_unconfigured(&self, table: &str) -> bool {
        let miss = PilferError::ConfigLookupMiss(format!("no rules for table {}", table));
        if self.warned_unconfigured.swap(true, Ordering::Relaxed) {
            debug!("{}: {}, passing rows through", table, miss);
            false
        } else {
            warn!(
                "{}: {}, passing rows through (further unconfigured tables are logged at debug level)",
                table, miss
            );
            true
        }
    }

    /// Compile the rules of `table`. `None` means rows pass through as-is.
    fn rules_for(&self, table: &str) -> Option<Vec<(String, Rule)>> {
        let Some(config) = self.tables.find(table) else {
            self.note_unconfigured(table);
            return None;
        };

        if config.anonymise.is_empty() {
            return None;
        }

        let mut rules = Vec::with_capacity(config.anonymise.len());
        for (column, spec) in &config.anonymise {
            match spec {
                GeneratorSpec::Literal(value) => {
                    rules.push((column.clone(), Rule::Literal(value.clone())));
                }
                GeneratorSpec::Generator(name) => match self.generators.get(name) {
                    Some(generator) => rules.push((column.clone(), Rule::Generate(generator))),
                    None => debug!(
                        "{}: unknown generator '{}' for column {}, leaving it unchanged",
                        table, name, column
                    ),
                },
            }
        }

        (!rules.is_empty()).then_some(rules)
    }
}

#[async_trait]
impl Reader for Anonymiser {
    async fn get_tables(&self) -> Result<Vec<String>> {
        self.inner.get_tables().await
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        self.inner.get_columns(table).await
    }

    async fn get_structure(&self) -> Result<String> {
        self.inner.get_structure().await
    }

    async fn read_table(
        &self,
        table: &str,
        sink: mpsc::Sender<Row>,
        opts: ReadTableOpt,
    ) -> Result<()> {
        let Some(rules) = self.rules_for(table) else {
            return self.inner.read_table(table, sink, opts).await;
        };

        debug!("{}: anonymising {} columns", table, rules.len());
        let (upstream_tx, upstream_rx) = mpsc::channel(RELAY_BUFFER);
        let (result, ()) = tokio::join!(
            self.inner.read_table(table, upstream_tx, opts),
            relay(table, &rules, upstream_rx, sink),
        );
        result
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Rewrite rows from `upstream` into `sink` until either side closes.
///
/// Returning drops both channel ends: the sink closes exactly once, after
/// upstream is exhausted, and an abandoned sink stops the upstream reader.
async fn relay(
    table: &str,
    rules: &[(String, Rule)],
    mut upstream: mpsc::Receiver<Row>,
    sink: mpsc::Sender<Row>,
) {
    let mut missing_warned: HashSet<&str> = HashSet::new();

    while let Some(mut row) = upstream.recv().await {
        for (column, rule) in rules {
            match row.get_mut(column) {
                Some(value) => {
                    *value = match rule {
                        Rule::Literal(literal) => Value::Text(literal.clone()),
                        Rule::Generate(generator) => generator(),
                    };
                }
                None => {
                    if missing_warned.insert(column.as_str()) {
                        warn!(
                            "{}: anonymised column {} is not in the table, skipping it",
                            table, column
                        );
                    }
                }
            }
        }

        if sink.send(row).await.is_err() {
            debug!("{}: row consumer went away, stopping relay", table);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use std::collections::BTreeMap;

    struct FixedReader {
        rows: Vec<Row>,
    }

    #[async_trait]
    impl Reader for FixedReader {
        async fn get_tables(&self) -> Result<Vec<String>> {
            Ok(vec!["users".to_string()])
        }

        async fn get_columns(&self, _table: &str) -> Result<Vec<String>> {
            Ok(vec!["id".to_string(), "email".to_string(), "name".to_string()])
        }

        async fn get_structure(&self) -> Result<String> {
            Ok("CREATE TABLE users (id INT);".to_string())
        }

        async fn read_table(
            &self,
            _table: &str,
            sink: mpsc::Sender<Row>,
            _opts: ReadTableOpt,
        ) -> Result<()> {
            for row in &self.rows {
                if sink.send(row.clone()).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    fn user(id: i64) -> Row {
        Row::from([
            ("id".to_string(), Value::Int(id)),
            ("email".to_string(), Value::from(format!("user{}@corp.example", id))),
            ("name".to_string(), Value::from(format!("User {}", id))),
        ])
    }

    fn anonymiser(anonymise: &[(&str, &str)]) -> Anonymiser {
        let reader = FixedReader {
            rows: (1..=3).map(user).collect(),
        };
        let tables = Tables::new(vec![TableConfig {
            name: "users".to_string(),
            anonymise: anonymise
                .iter()
                .map(|(c, s)| (c.to_string(), GeneratorSpec::from(*s)))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }]);
        Anonymiser::new(Arc::new(reader), tables, Arc::new(Generators::with_builtins()))
    }

    async fn collect(anonymiser: &Anonymiser, table: &str) -> Vec<Row> {
        let (tx, mut rx) = mpsc::channel(1);
        let read = anonymiser.read_table(table, tx, ReadTableOpt::unlimited());
        let gather = async {
            let mut rows = Vec::new();
            while let Some(row) = rx.recv().await {
                rows.push(row);
            }
            rows
        };
        let (result, rows) = tokio::join!(read, gather);
        result.unwrap();
        rows
    }

    #[tokio::test]
    async fn test_literal_and_generator_rules() {
        let anonymiser = anonymiser(&[("name", "literal:REDACTED"), ("email", "EmailAddress")]);
        let rows = collect(&anonymiser, "users").await;

        assert_eq!(rows.len(), 3);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row["id"], Value::Int(i as i64 + 1));
            assert_eq!(row["name"], Value::Text("REDACTED".to_string()));
            let email = row["email"].as_text().unwrap();
            assert!(email.contains('@'));
            assert!(!email.ends_with("@corp.example"));
        }
    }

    #[tokio::test]
    async fn test_unknown_generator_passes_through() {
        let anonymiser = anonymiser(&[("name", "NoSuchGenerator")]);
        let rows = collect(&anonymiser, "users").await;
        assert_eq!(rows, (1..=3).map(user).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unconfigured_table_delegates() {
        let anonymiser = anonymiser(&[("name", "literal:x")]);
        let rows = collect(&anonymiser, "sessions").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], Value::Text("User 1".to_string()));
    }

    #[tokio::test]
    async fn test_unconfigured_tables_warn_once() {
        let anonymiser = anonymiser(&[("name", "literal:x")]);
        assert!(anonymiser.note_unconfigured("sessions"));
        assert!(!anonymiser.note_unconfigured("audit_log"));

        collect(&anonymiser, "events").await;
        assert!(!anonymiser.note_unconfigured("events"));
    }

    #[tokio::test]
    async fn test_missing_column_is_not_inserted() {
        let anonymiser = anonymiser(&[("ssn", "literal:000-00-0000")]);
        let rows = collect(&anonymiser, "users").await;
        assert!(rows.iter().all(|r| !r.contains_key("ssn") && r.len() == 3));
    }

    #[tokio::test]
    async fn test_schema_calls_delegate() {
        let anonymiser = anonymiser(&[]);
        assert_eq!(anonymiser.get_tables().await.unwrap(), vec!["users"]);
        assert_eq!(anonymiser.get_columns("users").await.unwrap().len(), 3);
        assert!(anonymiser.get_structure().await.unwrap().starts_with("CREATE TABLE"));
    }

    #[tokio::test]
    async fn test_relay_closes_output_once_upstream_closes() {
        let (up_tx, up_rx) = mpsc::channel(4);
        let (down_tx, mut down_rx) = mpsc::channel(4);
        let rules = vec![("name".to_string(), Rule::Literal("x".to_string()))];

        let relay_task = tokio::spawn(async move { relay("users", &rules, up_rx, down_tx).await });
        up_tx.send(user(1)).await.unwrap();
        drop(up_tx);

        let first = down_rx.recv().await.unwrap();
        assert_eq!(first["name"], Value::Text("x".to_string()));
        assert!(down_rx.recv().await.is_none());
        assert!(down_rx.recv().await.is_none());
        relay_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_stops_when_sink_dropped() {
        let (up_tx, up_rx) = mpsc::channel(1);
        let (down_tx, down_rx) = mpsc::channel(1);
        drop(down_rx);

        let relay_task = tokio::spawn(async move { relay("users", &[], up_rx, down_tx).await });
        up_tx.send(user(1)).await.unwrap();
        relay_task.await.unwrap();
        assert!(up_tx.send(user(2)).await.is_err());
    }
}
