//! Get command implementation.

use super::{display_bytes, open_existing, CliError};
use hashdb_core::Config;
use std::path::Path;

/// Runs the get command.
pub fn run(path: &Path, key: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open_existing(path, Config::new().read_only(true))?;

    match db.compat_fetch(key)? {
        Some(value) => {
            println!("{}", display_bytes(value));
            Ok(())
        }
        None => Err(CliError::KeyNotFound(display_bytes(key)).into()),
    }
}
