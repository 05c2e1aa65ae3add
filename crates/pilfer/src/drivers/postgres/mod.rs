//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresReader`]: Source reader for PostgreSQL databases
//! - [`PostgresLoader`]: Destination bulk loader using `COPY`
//! - [`PostgresDriver`]: Registry entry for PostgreSQL connection strings
//!
//! Structure dumps shell out to `pg_dump`, which must be on `PATH`.

mod dialect;
mod loader;
mod pool;
mod reader;

pub use dialect::PostgresDialect;
pub use loader::PostgresLoader;
pub use reader::PostgresReader;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::catalog::{ConnOpts, Driver};
use crate::core::traits::{BulkLoader, Reader};
use crate::error::Result;

/// Driver for `postgres://` URLs and libpq key/value strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn is_supported(&self, dsn: &str) -> bool {
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            return true;
        }
        !dsn.contains("://")
            && dsn
                .split_whitespace()
                .any(|kv| kv.starts_with("host=") || kv.starts_with("dbname="))
    }

    async fn new_reader(&self, opts: &ConnOpts) -> Result<Arc<dyn Reader>> {
        Ok(Arc::new(PostgresReader::new(opts).await?))
    }

    async fn new_loader(&self, opts: &ConnOpts) -> Result<Arc<dyn BulkLoader>> {
        Ok(Arc::new(PostgresLoader::new(opts).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        let driver = PostgresDriver;
        assert!(driver.is_supported("postgres://u:p@localhost/prod"));
        assert!(driver.is_supported("postgresql://localhost/prod"));
        assert!(driver.is_supported("host=localhost dbname=prod user=u"));
        assert!(!driver.is_supported("mysql://root@localhost/prod"));
        assert!(!driver.is_supported("sqlite://prod.db"));
    }
}
