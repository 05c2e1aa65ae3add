//! Core abstractions for database-agnostic cloning.
//!
//! - [`value`]: Row and value representation
//! - [`traits`]: Reader, bulk loader and dialect traits
//! - [`catalog`]: Driver registry for dependency injection
//!
//! Driver modules (`drivers/mysql`, `drivers/postgres`) implement these
//! traits; the anonymiser and dumper only ever see the trait objects.

pub mod catalog;
pub mod traits;
pub mod value;

pub use catalog::{ConnOpts, Driver, DriverRegistry};
pub use traits::{BulkLoader, BytesFormat, Dialect, ReadTableOpt, Reader, RelationshipOpt};
pub use value::{Row, Value};
