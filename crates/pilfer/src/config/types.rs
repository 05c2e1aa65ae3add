//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::catalog::{redact_dsn, ConnOpts};

/// Root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source connection string. The command line may override it.
    #[serde(default)]
    pub source: Option<String>,

    /// Destination connection string. The command line may override it.
    #[serde(default)]
    pub target: Option<String>,

    /// Connection pool settings applied to both ends.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Dump engine settings.
    #[serde(default)]
    pub dump: DumpSettings,

    /// Per-table subsetting and anonymisation rules.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("source", &self.source.as_deref().map(redact_dsn))
            .field("target", &self.target.as_deref().map(redact_dsn))
            .field("connection", &self.connection)
            .field("dump", &self.dump)
            .field("tables", &self.tables)
            .finish()
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum open connections per pool (default: 10).
    #[serde(default = "default_max_conns")]
    pub max_conns: u32,

    /// Connections kept open while idle (default: 2).
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,

    /// Maximum connection lifetime in seconds, 0 for unlimited (default: 0).
    #[serde(default)]
    pub max_conn_lifetime_secs: u64,

    /// Dial timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_conns: default_max_conns(),
            max_idle_conns: default_max_idle_conns(),
            max_conn_lifetime_secs: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConnectionConfig {
    /// Connection options for a connection string.
    pub fn conn_opts(&self, dsn: impl Into<String>) -> ConnOpts {
        ConnOpts {
            dsn: dsn.into(),
            max_conns: self.max_conns,
            max_idle_conns: self.max_idle_conns,
            max_conn_lifetime: (self.max_conn_lifetime_secs > 0)
                .then(|| Duration::from_secs(self.max_conn_lifetime_secs)),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Dump engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpSettings {
    /// Tables loaded at the same time (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Rows buffered between reader and encoder (default: 1024).
    #[serde(default = "default_row_buffer")]
    pub row_buffer: usize,

    /// Target size of one encoded chunk in bytes (default: 1 MiB).
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            row_buffer: default_row_buffer(),
            chunk_bytes: default_chunk_bytes(),
        }
    }
}

/// Rules for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name.
    pub name: String,

    /// Row filter.
    #[serde(default)]
    pub filter: Filter,

    /// Foreign-key constraints restricting the rows read.
    #[serde(default)]
    pub relationships: Vec<Relationship>,

    /// Column name to replacement rule.
    #[serde(default, alias = "anonymize")]
    pub anonymise: BTreeMap<String, GeneratorSpec>,
}

/// Row filter of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Maximum rows to copy, 0 for unlimited.
    #[serde(default)]
    pub limit: u64,
}

/// A foreign-key relationship used for subsetting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Table holding the referenced keys.
    pub referenced_table: String,

    /// Column of the referenced table.
    pub referenced_key: String,

    /// Column of the configured table.
    pub foreign_key: String,
}

/// How an anonymised column is rewritten.
///
/// Written as `literal:<value>` for a fixed replacement, or as the name of a
/// registered generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GeneratorSpec {
    /// Replace with a fixed string.
    Literal(String),

    /// Replace with a fresh value from a named generator.
    Generator(String),
}

impl GeneratorSpec {
    /// Prefix marking a literal replacement.
    pub const LITERAL_PREFIX: &'static str = "literal:";
}

impl From<String> for GeneratorSpec {
    fn from(s: String) -> Self {
        match s.strip_prefix(Self::LITERAL_PREFIX) {
            Some(literal) => GeneratorSpec::Literal(literal.to_string()),
            None => GeneratorSpec::Generator(s),
        }
    }
}

impl From<&str> for GeneratorSpec {
    fn from(s: &str) -> Self {
        GeneratorSpec::from(s.to_string())
    }
}

impl From<GeneratorSpec> for String {
    fn from(spec: GeneratorSpec) -> Self {
        match spec {
            GeneratorSpec::Literal(v) => format!("{}{}", GeneratorSpec::LITERAL_PREFIX, v),
            GeneratorSpec::Generator(name) => name,
        }
    }
}

fn default_max_conns() -> u32 {
    10
}

fn default_max_idle_conns() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    4
}

fn default_row_buffer() -> usize {
    1024
}

fn default_chunk_bytes() -> usize {
    1024 * 1024
}
