//! Keys command implementation.

use super::{display_bytes, open_existing};
use hashdb_core::Config;
use std::path::Path;

/// Runs the keys command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = open_existing(path, Config::new().read_only(true))?;

    let mut keys = db.keys()?;
    keys.sort();
    for key in &keys {
        println!("{}", display_bytes(key));
    }
    Ok(())
}
