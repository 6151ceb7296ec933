//! Inspect command implementation.

use super::{open_existing, CliError};
use hashdb_core::{Config, Database, Header, FORMAT_VERSION, HEADER_LEN};
use hashdb_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// On-disk format version.
    pub format_version: u16,
    /// Block size in bytes.
    pub block_size: u32,
    /// Bucket size in bytes.
    pub bucket_size: u32,
    /// Directory depth.
    pub dir_bits: u32,
    /// Directory entries.
    pub dir_entries: usize,
    /// Directory offset.
    pub dir_offset: u64,
    /// First unallocated offset.
    pub next_block: u64,
    /// Bytes past the allocation cursor.
    pub unallocated_tail: u64,
    /// Distinct buckets.
    pub buckets: usize,
    /// Stored keys.
    pub key_count: usize,
    /// Mean entries per bucket.
    pub fill: f64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format != "text" && format != "json" {
        return Err(CliError::UnknownFormat(format.to_string()).into());
    }

    let header = read_header(path)?;
    let mut db = open_existing(path, Config::new().read_only(true))?;
    let result = inspect(path, &header, &mut db)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Decodes the header straight from the file, before any handle opens it.
fn read_header(path: &Path) -> Result<Header, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CliError::NoDatabase(path.display().to_string()).into());
    }
    let backend = FileBackend::open_read_only(path)?;
    let prefix = backend.read_at(0, HEADER_LEN)?;
    Ok(Header::decode(&prefix)?)
}

fn inspect(
    path: &Path,
    header: &Header,
    db: &mut Database,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let stats = db.stats()?;
    let key_count = db.keys()?.len();

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: stats.file_size,
        format_version: FORMAT_VERSION,
        block_size: header.block_size,
        bucket_size: header.bucket_size,
        dir_bits: header.dir_bits,
        dir_entries: stats.dir_entries,
        dir_offset: header.dir,
        next_block: header.next_block,
        unallocated_tail: stats.file_size.saturating_sub(header.next_block),
        buckets: stats.buckets,
        key_count,
        fill: key_count as f64 / stats.buckets.max(1) as f64,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("hashdb Database Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!("Format version: {}", result.format_version);
    println!();
    println!("Storage:");
    println!("  File size:     {}", format_size(result.file_size));
    println!("  Block size:    {} bytes", result.block_size);
    println!("  Bucket size:   {} bytes", result.bucket_size);
    println!("  Next block:    {}", result.next_block);
    if result.unallocated_tail > 0 {
        println!("  Unallocated:   {}", format_size(result.unallocated_tail));
    }
    println!();
    println!("Directory:");
    println!("  Offset:        {}", result.dir_offset);
    println!("  Depth:         {} bits", result.dir_bits);
    println!("  Entries:       {}", result.dir_entries);
    println!();
    println!("Contents:");
    println!("  Buckets:       {}", result.buckets);
    println!("  Keys:          {}", result.key_count);
    println!("  Keys/bucket:   {:.2}", result.fill);
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
