//! Connection pool shared by the PostgreSQL reader and loader.

use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use tokio_postgres::Config as PgConfig;
use tracing::{info, warn};

use crate::core::catalog::{redact_dsn, ConnOpts};
use crate::error::{postgres_message, PilferError, Result};

/// Build a pool for the connection string and test one connection.
///
/// `role` names the side ("source" or "destination") in errors and logs.
pub(crate) async fn connect(opts: &ConnOpts, role: &str) -> Result<Pool> {
    let mut pg_config: PgConfig = opts
        .dsn
        .parse()
        .map_err(|e| PilferError::connection(e, format!("parsing PostgreSQL {} DSN", role)))?;
    pg_config.connect_timeout(opts.timeout);

    if opts.max_conn_lifetime.is_some() {
        warn!("PostgreSQL pools do not support max_conn_lifetime; ignoring it");
    }

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(opts.max_conns.max(1) as usize)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(opts.timeout))
        .create_timeout(Some(opts.timeout))
        .build()
        .map_err(|e| PilferError::connection(e, format!("creating PostgreSQL {} pool", role)))?;

    // Test connection
    let client = pool.get().await.map_err(|e| {
        PilferError::connection(
            pool_message(&e),
            format!("testing PostgreSQL {} connection", role),
        )
    })?;
    client.simple_query("SELECT 1").await?;

    info!(
        "Connected to PostgreSQL {}: {}",
        role,
        redact_dsn(&opts.dsn)
    );

    Ok(pool)
}

/// Describe a pool checkout failure, keeping the server's message.
pub(crate) fn pool_message(e: &PoolError) -> String {
    match e {
        PoolError::Backend(e) => postgres_message(e),
        other => other.to_string(),
    }
}
