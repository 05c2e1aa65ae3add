//! PostgreSQL source reader implementation.
//!
//! Implements the `Reader` trait over a deadpool-postgres pool. Structure is
//! produced by `pg_dump --schema-only` over the whole schema, so enum types,
//! domains and functions the tables depend on come along. Rows are streamed
//! with `query_raw`; columns of types without a native decoder are read
//! through a `::text` cast.

use std::collections::HashSet;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Object, Pool};
use futures::TryStreamExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_postgres::types::{FromSql, Type};
use tracing::debug;

use crate::core::catalog::ConnOpts;
use crate::core::traits::{Dialect, ReadTableOpt, Reader};
use crate::core::value::{Row, Value};
use crate::dialect::{build_projected_subset_query, OrderKeys};
use crate::drivers::structure_header;
use crate::error::{postgres_message, PilferError, Result};

use super::dialect::PostgresDialect;
use super::pool::{self, pool_message};

/// Executable producing the DDL.
const PG_DUMP: &str = "pg_dump";

/// PostgreSQL source reader implementation.
pub struct PostgresReader {
    pool: Pool,
    dsn: String,
    dialect: PostgresDialect,
}

impl PostgresReader {
    /// Open a pool for the connection string and test it.
    pub async fn new(opts: &ConnOpts) -> Result<Self> {
        let pool = pool::connect(opts, "source").await?;
        Ok(Self {
            pool,
            dsn: opts.dsn.clone(),
            dialect: PostgresDialect::new(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            PilferError::connection(pool_message(&e), "getting PostgreSQL connection")
        })
    }

    /// Primary key columns of a table, in key order.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT a.attname::text
            FROM pg_index i
            JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = to_regclass(quote_ident(current_schema()) || '.' || quote_ident($1::text))
              AND i.indisprimary
            ORDER BY array_position(i.indkey::int2[], a.attnum)
        "#;

        let client = self.client().await?;
        let rows = client.query(query, &[&table]).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    /// Column names and type OIDs of a table, in schema order.
    async fn column_types(&self, table: &str) -> Result<Vec<(String, u32)>> {
        let query = r#"
            SELECT a.attname::text, a.atttypid
            FROM pg_attribute a
            WHERE a.attrelid = to_regclass(quote_ident(current_schema()) || '.' || quote_ident($1::text))
              AND a.attnum > 0 AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let client = self.client().await?;
        let rows = client.query(query, &[&table]).await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, u32>(1)))
            .collect())
    }

    /// Ordering used for every limited table in the read tree.
    async fn order_keys(&self, table: &str, opts: &ReadTableOpt) -> Result<OrderKeys> {
        let mut keys = OrderKeys::new();
        let mut pending: Vec<(&str, &ReadTableOpt)> = vec![(table, opts)];
        let mut seen = HashSet::new();

        while let Some((name, opts)) = pending.pop() {
            for rel in &opts.relationships {
                pending.push((rel.referenced_table.as_str(), &rel.referenced));
            }
            if opts.limit == 0 || !seen.insert(name.to_string()) {
                continue;
            }
            let mut order = self.primary_key(name).await?;
            if order.is_empty() {
                order = self.get_columns(name).await?;
            }
            keys.insert(name.to_string(), order);
        }

        Ok(keys)
    }

    /// Run `pg_dump --schema-only` for the whole schema.
    async fn dump_schema(&self, schema: &str) -> Result<String> {
        let output = Command::new(PG_DUMP)
            .arg("--schema-only")
            .arg("--no-owner")
            .arg("--no-privileges")
            .arg("--schema")
            .arg(self.dialect.quote_ident(schema))
            .arg("--dbname")
            .arg(&self.dsn)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PilferError::connection(e, format!("running {}", PG_DUMP)))?;

        if !output.status.success() {
            return Err(PilferError::connection(
                String::from_utf8_lossy(&output.stderr).trim(),
                format!("{} exited with {}", PG_DUMP, output.status),
            ));
        }

        Ok(clean_schema_dump(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Drop what cannot run over the wire and make schema creation repeatable.
fn clean_schema_dump(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        // psql meta-commands such as \restrict
        if line.starts_with('\\') {
            continue;
        }
        match line.strip_prefix("CREATE SCHEMA ") {
            Some(rest) if !rest.starts_with("IF NOT EXISTS ") => {
                out.push_str("CREATE SCHEMA IF NOT EXISTS ");
                out.push_str(rest);
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// Types [`decode`] reads in binary form.
fn decodes_natively(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::BYTEA
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::DATE
            | Type::TIME
            | Type::UUID
            | Type::JSON
            | Type::JSONB
    )
}

/// Select list reading every column, casting the ones without a native
/// decoder to text under their own name.
fn select_list(dialect: &PostgresDialect, columns: &[(String, u32)]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    columns
        .iter()
        .map(|(name, oid)| {
            let quoted = dialect.quote_ident(name);
            match Type::from_oid(*oid) {
                Some(ty) if decodes_natively(&ty) => quoted,
                _ => format!("{}::text AS {}", quoted, quoted),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a nullable column as `T` and wrap it.
fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: impl FnOnce(T) -> Value,
) -> Option<Value> {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => Some(wrap(v)),
        Ok(None) => Some(Value::Null),
        Err(_) => None,
    }
}

/// Decode one column of a row by its reported type.
fn decode(row: &tokio_postgres::Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();
    let decoded = match *ty {
        Type::BOOL => get(row, idx, Value::Bool),
        Type::INT2 => get(row, idx, |v: i16| Value::Int(v.into())),
        Type::INT4 => get(row, idx, |v: i32| Value::Int(v.into())),
        Type::INT8 => get(row, idx, Value::Int),
        Type::OID => get(row, idx, |v: u32| Value::Int(v.into())),
        Type::FLOAT4 => get(row, idx, |v: f32| Value::Float(v.into())),
        Type::FLOAT8 => get(row, idx, Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get(row, idx, Value::Text),
        Type::BYTEA => get(row, idx, Value::Bytes),
        Type::TIMESTAMP => get(row, idx, Value::Timestamp),
        Type::TIMESTAMPTZ => get(row, idx, |v: chrono::DateTime<Utc>| {
            Value::Timestamp(v.naive_utc())
        }),
        Type::DATE => get(row, idx, |v: chrono::NaiveDate| Value::Text(v.to_string())),
        Type::TIME => get(row, idx, |v: chrono::NaiveTime| Value::Text(v.to_string())),
        Type::UUID => get(row, idx, |v: uuid::Uuid| Value::Text(v.to_string())),
        Type::JSON | Type::JSONB => {
            get(row, idx, |v: serde_json::Value| Value::Text(v.to_string()))
        }
        _ => get(row, idx, Value::Text),
    };

    decoded.unwrap_or_else(|| Value::unsupported(ty.name()))
}

fn row_to_values(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), decode(row, i)))
        .collect()
}

#[async_trait]
impl Reader for PostgresReader {
    async fn get_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let client = self.client().await?;
        let rows = client.query(query, &[]).await?;
        let tables: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        debug!("Found {} PostgreSQL tables", tables.len());
        Ok(tables)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1::text
            ORDER BY ordinal_position
        "#;

        let client = self.client().await?;
        let rows = client.query(query, &[&table]).await?;
        if rows.is_empty() {
            return Err(PilferError::schema_lookup(table));
        }
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn get_structure(&self) -> Result<String> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT COALESCE(inet_server_addr()::text, 'localhost'), \
                 current_database()::text, current_schema()::text",
                &[],
            )
            .await
            .map_err(|e| {
                PilferError::connection(postgres_message(&e), "reading PostgreSQL server identity")
            })?;
        let host: String = row.get(0);
        let database: String = row.get(1);
        let schema: String = row.get(2);
        drop(client);

        let mut ddl = structure_header(&host, &database, Utc::now());
        ddl.push_str(&self.dump_schema(&schema).await?);
        Ok(ddl)
    }

    async fn read_table(&self, table: &str, sink: mpsc::Sender<Row>, opts: ReadTableOpt) -> Result<()> {
        let order_keys = self.order_keys(table, &opts).await?;
        let columns = self.column_types(table).await?;
        let sql = build_projected_subset_query(
            &self.dialect,
            table,
            &select_list(&self.dialect, &columns),
            &opts,
            &order_keys,
        );
        debug!("{}: {}", table, sql);

        let client = self.client().await?;
        let rows = client
            .query_raw(sql.as_str(), Vec::<String>::new())
            .await
            .map_err(|e| PilferError::read_table(table, postgres_message(&e)))?;
        futures::pin_mut!(rows);

        loop {
            let row = match rows.try_next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(PilferError::read_table(table, postgres_message(&e))),
            };
            if sink.send(row_to_values(&row)).await.is_err() {
                debug!("{}: row receiver closed, stopping read", table);
                break;
            }
        }

        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
