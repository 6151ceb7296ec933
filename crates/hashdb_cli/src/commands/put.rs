//! Put command implementation.

use hashdb_core::{Config, Database, StoreMode};
use std::path::Path;
use tracing::info;

/// Options for the put command.
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// Overwrite an existing value.
    pub replace: bool,
    /// Defer durability barriers.
    pub fast_write: bool,
    /// Block size if the database is created.
    pub block_size: u32,
}

/// Runs the put command.
pub fn run(
    path: &Path,
    key: &[u8],
    value: &[u8],
    options: &PutOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new()
        .block_size(options.block_size)
        .fast_write(options.fast_write);
    let mut db = Database::open_with_config(path, config)?;

    let mode = if options.replace {
        StoreMode::Replace
    } else {
        StoreMode::Insert
    };
    db.store(key, value, mode)?;
    db.close()?;

    info!(key_len = key.len(), value_len = value.len(), "stored entry");
    Ok(())
}
