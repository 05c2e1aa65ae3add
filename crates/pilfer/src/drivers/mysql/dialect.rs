//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::traits::Dialect;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Quote a string literal for the default SQL mode.
    pub fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    /// `LOAD DATA LOCAL INFILE` statement reading the named stream into `table`.
    ///
    /// Matches the record format of [`RecordEncoder`](crate::dumper::RecordEncoder).
    pub fn load_data_statement(&self, stream_name: &str, table: &str, columns: &[String]) -> String {
        format!(
            "LOAD DATA LOCAL INFILE {} INTO TABLE {} \
             FIELDS TERMINATED BY ',' ENCLOSED BY '\"' ESCAPED BY '\"' \
             LINES TERMINATED BY '\\n' ({})",
            self.quote_string(stream_name),
            self.quote_ident(table),
            self.column_list(columns)
        )
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Backticks inside a name are doubled
        format!("`{}`", name.replace('`', "``"))
    }
}
