//! Database driver implementations.
//!
//! Each driver module provides:
//! - a `Dialect` for identifier quoting
//! - a [`Reader`](crate::core::Reader) for the source side
//! - a [`BulkLoader`](crate::core::BulkLoader) for the destination side
//! - a [`Driver`](crate::core::Driver) tying them to connection strings
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `Reader`, `BulkLoader` and `Driver`
//! 3. Register the driver in `DriverRegistry::with_builtins()`
//! 4. Gate the driver with a feature flag in `Cargo.toml`

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub use mysql::{MysqlDialect, MysqlDriver, MysqlLoader, MysqlReader};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDialect, PostgresDriver, PostgresLoader, PostgresReader};

use chrono::{DateTime, Utc};

/// Comment block opening every structure dump.
///
/// Everything but `generated_at` is stable for a given source, so two dumps
/// of an unchanged database differ only in the timestamp line.
pub fn structure_header(host: &str, database: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "-- {} {}\n--\n-- Host: {}    Database: {}\n-- Generated at: {}\n\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        host,
        database,
        generated_at.to_rfc2822()
    )
}
