//! Delete command implementation.

use super::{display_bytes, open_existing, CliError};
use hashdb_core::Config;
use std::path::Path;

/// Runs the delete command.
pub fn run(path: &Path, key: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open_existing(path, Config::new())?;
    let removed = db.delete(key)?;
    db.close()?;

    if removed {
        Ok(())
    } else {
        Err(CliError::KeyNotFound(display_bytes(key)).into())
    }
}
