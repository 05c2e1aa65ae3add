//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::traits::Dialect;
use crate::dumper::NULL_TOKEN;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// `COPY ... FROM STDIN` statement accepting encoder output.
    ///
    /// CSV mode treats only the bare null token as NULL, so a quoted
    /// `"NULL"` string still loads as text. The target is schema-qualified
    /// so the session's `search_path` does not matter.
    pub fn copy_statement(&self, schema: &str, table: &str, columns: &[String]) -> String {
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, NULL '{}')",
            self.qualified(schema, table),
            self.column_list(columns),
            String::from_utf8_lossy(NULL_TOKEN)
        )
    }

    /// Schema-qualified table name.
    pub fn qualified(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::ReadTableOpt;
    use crate::dialect::{build_subset_query, OrderKeys};

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("my\"table"), "\"my\"\"table\"");
    }

    #[test]
    fn test_copy_statement() {
        let dialect = PostgresDialect::new();
        let sql =
            dialect.copy_statement("public", "users", &["id".to_string(), "name".to_string()]);
        assert_eq!(
            sql,
            "COPY \"public\".\"users\" (\"id\", \"name\") FROM STDIN WITH (FORMAT csv, NULL 'NULL')"
        );
    }

    #[test]
    fn test_qualified() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.qualified("public", "Users"), "\"public\".\"Users\"");
    }

    #[test]
    fn test_subset_query_without_order_keys() {
        let dialect = PostgresDialect::new();
        let sql = build_subset_query(
            &dialect,
            "events",
            &ReadTableOpt::with_limit(3),
            &OrderKeys::new(),
        );
        assert_eq!(sql, "SELECT * FROM \"events\" LIMIT 3");
    }
}
