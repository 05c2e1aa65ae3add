//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::error::{PilferError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.connection.max_conns == 0 {
        return Err(PilferError::Config(
            "connection.max_conns must be at least 1".into(),
        ));
    }

    if config.dump.concurrency == 0 {
        return Err(PilferError::Config(
            "dump.concurrency must be at least 1".into(),
        ));
    }
    if config.dump.row_buffer == 0 {
        return Err(PilferError::Config(
            "dump.row_buffer must be at least 1".into(),
        ));
    }
    if config.dump.chunk_bytes == 0 {
        return Err(PilferError::Config(
            "dump.chunk_bytes must be at least 1".into(),
        ));
    }

    let mut seen = HashSet::new();
    for (idx, table) in config.tables.iter().enumerate() {
        if table.name.is_empty() {
            return Err(PilferError::Config(format!(
                "tables[{}].name is required",
                idx
            )));
        }
        if !seen.insert(table.name.as_str()) {
            return Err(PilferError::Config(format!(
                "table '{}' is configured more than once",
                table.name
            )));
        }

        for (rel_idx, rel) in table.relationships.iter().enumerate() {
            let fields = [
                ("referenced_table", &rel.referenced_table),
                ("referenced_key", &rel.referenced_key),
                ("foreign_key", &rel.foreign_key),
            ];
            for (field, value) in fields {
                if value.is_empty() {
                    return Err(PilferError::Config(format!(
                        "{}.relationships[{}].{} is required",
                        table.name, rel_idx, field
                    )));
                }
            }
        }

        if table.anonymise.keys().any(|col| col.is_empty()) {
            return Err(PilferError::Config(format!(
                "{}.anonymise has an empty column name",
                table.name
            )));
        }
    }

    Ok(())
}
