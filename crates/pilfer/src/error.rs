//! Error types for the cloning library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection and driver resolution errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code when the destination structure could not be applied.
pub const EXIT_STRUCTURE_ERROR: u8 = 3;
/// Exit code for table-scoped failures that escaped the dumper.
pub const EXIT_TABLE_ERROR: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for pilfer operations.
#[derive(Error, Debug)]
pub enum PilferError {
    /// Configuration error (invalid YAML, duplicate tables, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No registered driver accepts the connection string
    #[error("No supported driver for connection string ({0})")]
    NoSupportedDriver(String),

    /// Dial, authentication or pool error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// The source structure could not be applied to the destination
    #[error("Failed to apply structure to destination: {0}")]
    StructureApply(String),

    /// A table or relationship refers to configuration that does not exist
    #[error("Configuration lookup failed: {0}")]
    ConfigLookupMiss(String),

    /// The table does not exist in the source schema
    #[error("Table {0} not found in source schema")]
    SchemaLookup(String),

    /// A row value could not be written to the bulk-load stream
    #[error("Cannot encode column {column} of table {table}: {message}")]
    ValueEncoding {
        table: String,
        column: String,
        message: String,
    },

    /// Relationships form a cycle and cannot be resolved into a subquery
    #[error("Relationship cycle detected: {0}")]
    RelationshipCycle(String),

    /// Query or connection failure while streaming rows out of the source
    #[error("Read failed for table {table}: {message}")]
    ReadTable { table: String, message: String },

    /// Bulk load or transaction failure on the destination
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// MySQL source error
    #[cfg(feature = "mysql")]
    #[error("MySQL source error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// MySQL destination error
    #[cfg(feature = "mysql")]
    #[error("MySQL destination error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {}", postgres_message(.0))]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations, external processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PilferError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        PilferError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a ReadTable error
    pub fn read_table(table: impl Into<String>, message: impl ToString) -> Self {
        PilferError::ReadTable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Load error
    pub fn load(table: impl Into<String>, message: impl ToString) -> Self {
        PilferError::Load {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a ValueEncoding error
    pub fn encoding(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PilferError::ValueEncoding {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a SchemaLookup error
    pub fn schema_lookup(table: impl Into<String>) -> Self {
        PilferError::SchemaLookup(table.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PilferError::Config(_)
            | PilferError::Yaml(_)
            | PilferError::Json(_)
            | PilferError::ConfigLookupMiss(_)
            | PilferError::RelationshipCycle(_) => EXIT_CONFIG_ERROR,
            PilferError::NoSupportedDriver(_) | PilferError::Connection { .. } => {
                EXIT_CONNECTION_ERROR
            }
            #[cfg(feature = "mysql")]
            PilferError::Sqlx(_) | PilferError::Mysql(_) => EXIT_CONNECTION_ERROR,
            #[cfg(feature = "postgres")]
            PilferError::Postgres(_) => EXIT_CONNECTION_ERROR,
            PilferError::StructureApply(_) => EXIT_STRUCTURE_ERROR,
            PilferError::SchemaLookup(_)
            | PilferError::ValueEncoding { .. }
            | PilferError::ReadTable { .. }
            | PilferError::Load { .. } => EXIT_TABLE_ERROR,
            PilferError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Describe a PostgreSQL error by the server's own message.
///
/// The `Display` of a server-side error is only "db error"; the severity,
/// message and detail live in the attached `DbError`.
#[cfg(feature = "postgres")]
pub fn postgres_message(e: &tokio_postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut message = format!("{}: {}", db.severity(), db.message());
        if let Some(detail) = db.detail() {
            message.push_str(&format!(" ({})", detail));
        }
        return message;
    }
    match std::error::Error::source(e) {
        Some(source) => format!("{}: {}", e, source),
        None => e.to_string(),
    }
}

/// Result type alias for pilfer operations.
pub type Result<T> = std::result::Result<T, PilferError>;
