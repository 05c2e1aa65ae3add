//! # pilfer
//!
//! Clone a relational database into another one while anonymising
//! sensitive columns and sampling related rows.
//!
//! This library provides:
//!
//! - **Driver registry** resolving connection strings to MySQL or PostgreSQL
//! - **Streaming readers** with row limits and foreign-key-aware subsetting
//! - **Anonymiser** replacing configured columns with fake data
//! - **Dump engine** loading every table in parallel, one transaction each
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pilfer::{Anonymiser, Config, ConnOpts, DriverRegistry, DumpEngine, Generators};
//! use tokio::sync::oneshot;
//!
//! #[tokio::main]
//! async fn main() -> pilfer::Result<()> {
//!     let config = Config::load("pilfer.yaml")?;
//!     let registry = DriverRegistry::with_builtins();
//!
//!     let reader = registry.open_reader(&ConnOpts::new("mysql://root@localhost/prod")).await?;
//!     let loader = registry.open_loader(&ConnOpts::new("postgres://localhost/copy")).await?;
//!     let reader = Arc::new(Anonymiser::new(
//!         reader,
//!         config.tables(),
//!         Arc::new(Generators::with_builtins()),
//!     ));
//!
//!     let engine = DumpEngine::new(reader, loader, config.dump.clone().into());
//!     let (done_tx, done_rx) = oneshot::channel();
//!     engine.dump(done_tx, &config.tables()).await?;
//!     if let Ok(report) = done_rx.await {
//!         println!("Copied {} rows", report.rows_total());
//!     }
//!     Ok(())
//! }
//! ```

pub mod anonymiser;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod dumper;
pub mod error;

// Re-exports for convenient access
pub use anonymiser::{Anonymiser, Generators};
pub use config::{Config, Tables};
pub use crate::core::{
    BulkLoader, BytesFormat, ConnOpts, Driver, DriverRegistry, ReadTableOpt, Reader, Row,
    Value,
};
pub use dumper::{DumpConfig, DumpEngine, DumpReport, TableReport, TableStatus};
pub use error::{PilferError, Result};
