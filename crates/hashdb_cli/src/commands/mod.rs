//! CLI command implementations.

pub mod delete;
pub mod get;
pub mod inspect;
pub mod keys;
pub mod put;

use hashdb_core::{Config, Database};
use std::path::Path;
use thiserror::Error;

/// Failures reported by the commands themselves.
#[derive(Debug, Error)]
pub enum CliError {
    /// No database file at the given path.
    #[error("no database found at {0}")]
    NoDatabase(String),

    /// The key is not present.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Unknown `--format` value.
    #[error("unsupported output format: {0} (expected text or json)")]
    UnknownFormat(String),
}

/// Opens an existing database for reading.
pub(crate) fn open_existing(path: &Path, config: Config) -> Result<Database, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CliError::NoDatabase(path.display().to_string()).into());
    }
    Ok(Database::open_with_config(path, config.create_if_missing(false))?)
}

/// Renders bytes for the terminal, escaping anything that is not printable.
pub(crate) fn display_bytes(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}
