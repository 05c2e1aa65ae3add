//! Driver registry for explicit dependency injection.
//!
//! The [`DriverRegistry`] maps a connection string to the backend that can
//! serve it. It is constructed at the composition root and passed around
//! explicitly; drivers are tried in registration order and the first one
//! whose [`Driver::is_supported`] accepts the string wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{PilferError, Result};

use super::traits::{BulkLoader, Reader};

/// Connection parameters handed to a driver.
#[derive(Clone)]
pub struct ConnOpts {
    /// Connection string.
    pub dsn: String,

    /// Maximum open connections in the pool.
    pub max_conns: u32,

    /// Connections kept open while idle.
    pub max_idle_conns: u32,

    /// Maximum lifetime of a pooled connection. `None` means unlimited.
    pub max_conn_lifetime: Option<Duration>,

    /// Bound on the initial dial.
    pub timeout: Duration,
}

impl ConnOpts {
    /// Options for a connection string with default pool sizing.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_conns: 10,
            max_idle_conns: 2,
            max_conn_lifetime: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Idle connections, never above the open connection cap.
    pub fn idle_conns(&self) -> u32 {
        self.max_idle_conns.min(self.max_conns)
    }
}

impl std::fmt::Debug for ConnOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnOpts")
            .field("dsn", &redact_dsn(&self.dsn))
            .field("max_conns", &self.max_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Hide the password of a URL-style connection string.
pub fn redact_dsn(dsn: &str) -> String {
    let Some((scheme, rest)) = dsn.split_once("://") else {
        return "[REDACTED]".to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{}://{}:[REDACTED]@{}", scheme, user, host)
        }
        None => dsn.to_string(),
    }
}

/// Scheme of a connection string, used in error messages.
pub fn dsn_scheme(dsn: &str) -> &str {
    dsn.split_once("://").map_or("unknown scheme", |(scheme, _)| scheme)
}

/// A database backend.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name (e.g. "mysql").
    fn name(&self) -> &str;

    /// Whether this driver can open the connection string.
    fn is_supported(&self, dsn: &str) -> bool;

    /// Open a source reader.
    async fn new_reader(&self, opts: &ConnOpts) -> Result<Arc<dyn Reader>>;

    /// Open a destination bulk loader.
    async fn new_loader(&self, opts: &ConnOpts) -> Result<Arc<dyn BulkLoader>>;
}

/// Ordered registry of database drivers.
///
/// # Example
///
/// ```rust,ignore
/// let registry = DriverRegistry::with_builtins();
/// let reader = registry.open_reader(&ConnOpts::new("mysql://root@localhost/prod")).await?;
/// ```
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the drivers compiled into this build.
    ///
    /// MySQL is registered before PostgreSQL.
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "mysql")]
        registry.register(crate::drivers::MysqlDriver);

        #[cfg(feature = "postgres")]
        registry.register(crate::drivers::PostgresDriver);

        registry
    }

    /// Append a driver to the lookup order.
    pub fn register(&mut self, driver: impl Driver + 'static) {
        self.drivers.push(Arc::new(driver));
    }

    /// Append a shared driver to the lookup order.
    pub fn register_arc(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.push(driver);
    }

    /// Names of registered drivers in lookup order.
    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// First driver that accepts the connection string.
    pub fn resolve(&self, dsn: &str) -> Result<Arc<dyn Driver>> {
        if dsn.trim().is_empty() {
            return Err(PilferError::NoSupportedDriver(
                "empty connection string".to_string(),
            ));
        }

        self.drivers
            .iter()
            .find(|d| d.is_supported(dsn))
            .cloned()
            .inspect(|d| debug!("Resolved {} to driver {}", redact_dsn(dsn), d.name()))
            .ok_or_else(|| PilferError::NoSupportedDriver(dsn_scheme(dsn).to_string()))
    }

    /// Resolve and open a source reader.
    pub async fn open_reader(&self, opts: &ConnOpts) -> Result<Arc<dyn Reader>> {
        self.resolve(&opts.dsn)?.new_reader(opts).await
    }

    /// Resolve and open a destination loader.
    pub async fn open_loader(&self, opts: &ConnOpts) -> Result<Arc<dyn BulkLoader>> {
        self.resolve(&opts.dsn)?.new_loader(opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixDriver {
        name: &'static str,
        prefix: &'static str,
    }

    #[async_trait]
    impl Driver for PrefixDriver {
        fn name(&self) -> &str {
            self.name
        }

        fn is_supported(&self, dsn: &str) -> bool {
            dsn.starts_with(self.prefix)
        }

        async fn new_reader(&self, _opts: &ConnOpts) -> Result<Arc<dyn Reader>> {
            Err(PilferError::connection("not dialable", self.name))
        }

        async fn new_loader(&self, _opts: &ConnOpts) -> Result<Arc<dyn BulkLoader>> {
            Err(PilferError::connection("not dialable", self.name))
        }
    }

    fn registry() -> DriverRegistry {
        let mut registry = DriverRegistry::new();
        registry.register(PrefixDriver {
            name: "first",
            prefix: "db://",
        });
        registry.register(PrefixDriver {
            name: "second",
            prefix: "db",
        });
        registry
    }

    #[test]
    fn test_first_matching_driver_wins() {
        let registry = registry();
        assert_eq!(registry.resolve("db://host/x").unwrap().name(), "first");
        assert_eq!(registry.resolve("dbx:host").unwrap().name(), "second");
        assert_eq!(registry.driver_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_dsn_is_unsupported() {
        let err = registry().resolve("   ").err().unwrap();
        assert!(matches!(err, PilferError::NoSupportedDriver(_)));
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        let err = registry().resolve("redis://localhost").err().unwrap();
        assert!(matches!(err, PilferError::NoSupportedDriver(ref s) if s == "redis"));
    }

    #[tokio::test]
    async fn test_open_reader_propagates_connection_error() {
        let err = registry()
            .open_reader(&ConnOpts::new("db://host/x"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PilferError::Connection { .. }));
    }

    #[test]
    fn test_redact_dsn_hides_password() {
        assert_eq!(
            redact_dsn("mysql://root:hunter2@db:3306/prod"),
            "mysql://root:[REDACTED]@db:3306/prod"
        );
        assert_eq!(redact_dsn("mysql://db/prod"), "mysql://db/prod");
        let debug = format!("{:?}", ConnOpts::new("postgres://u:secret@h/db"));
        assert!(!debug.contains("secret"));
    }

    #[cfg(all(feature = "mysql", feature = "postgres"))]
    #[test]
    fn test_builtins_lookup_order() {
        let registry = DriverRegistry::with_builtins();
        assert_eq!(registry.driver_names(), vec!["mysql", "postgres"]);
        assert_eq!(registry.resolve("mysql://u@h/db").unwrap().name(), "mysql");
        assert_eq!(
            registry.resolve("postgres://u@h/db").unwrap().name(),
            "postgres"
        );
    }
}
