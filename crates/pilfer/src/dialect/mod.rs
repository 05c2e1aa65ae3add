//! Dialect-generic SQL generation.
//!
//! Drivers provide identifier quoting through [`Dialect`]; everything built
//! on top of it lives here so MySQL and PostgreSQL share one subsetting
//! algorithm.

mod subset;

pub use subset::{build_projected_subset_query, build_subset_query, OrderKeys};

pub use crate::core::traits::Dialect;
