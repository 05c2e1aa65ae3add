//! Relationship-aware row subsetting.
//!
//! A table's effective sample is expressed as a single `SELECT`. Each
//! relationship becomes an `IN` predicate over the referenced table's own
//! effective sample, nested as deep as the relationship chain goes, so the
//! whole chain resolves in one round trip and parents never need to be read
//! before children.
//!
//! Samples with a limit are wrapped in a derived table
//! (`SELECT key FROM (...) AS alias`) because MySQL rejects `LIMIT` directly
//! inside an `IN` subquery.

use std::collections::HashMap;

use crate::core::traits::{Dialect, ReadTableOpt};

/// Stable ordering columns per table, used whenever a limit applies.
///
/// Readers fill this with the primary key, or every column when a table has
/// no primary key.
pub type OrderKeys = HashMap<String, Vec<String>>;

/// Build the query reading `table` with the given options.
///
/// A limited sample is ordered by the table's entry in `order_keys`; a table
/// without an entry is limited in engine order. Unlimited reads are never
/// ordered.
pub fn build_subset_query(
    dialect: &dyn Dialect,
    table: &str,
    opts: &ReadTableOpt,
    order_keys: &OrderKeys,
) -> String {
    build_projected_subset_query(dialect, table, "*", opts, order_keys)
}

/// Like [`build_subset_query`], selecting `select_list` from the outermost
/// table. Referenced samples always select `*`.
pub fn build_projected_subset_query(
    dialect: &dyn Dialect,
    table: &str,
    select_list: &str,
    opts: &ReadTableOpt,
    order_keys: &OrderKeys,
) -> String {
    let mut alias_seq = 0;
    sample_query(dialect, table, select_list, opts, order_keys, &mut alias_seq)
}

fn sample_query(
    dialect: &dyn Dialect,
    table: &str,
    select_list: &str,
    opts: &ReadTableOpt,
    order_keys: &OrderKeys,
    alias_seq: &mut usize,
) -> String {
    let mut sql = format!("SELECT {} FROM {}", select_list, dialect.quote_ident(table));

    let mut conditions = Vec::with_capacity(opts.relationships.len());
    for rel in &opts.relationships {
        let parent = sample_query(
            dialect,
            &rel.referenced_table,
            "*",
            &rel.referenced,
            order_keys,
            alias_seq,
        );
        *alias_seq += 1;
        conditions.push(format!(
            "{} IN (SELECT {} FROM ({}) AS {})",
            dialect.quote_ident(&rel.foreign_key),
            dialect.quote_ident(&rel.referenced_key),
            parent,
            dialect.quote_ident(&format!("pilfer_{}", alias_seq)),
        ));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if opts.limit > 0 {
        if let Some(keys) = order_keys.get(table).filter(|k| !k.is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&dialect.column_list(keys));
        }
        sql.push_str(&format!(" LIMIT {}", opts.limit));
    }

    sql
}
