//! # hashdb Core
//!
//! Single-file extendible-hash key/value store.
//!
//! This crate provides:
//! - The on-disk formats: header, directory and bucket blocks
//! - A bounded bucket cache with per-slot dirty tracking
//! - The durable-write primitive every file write goes through
//! - The commit protocol: buckets, then the directory, then the header,
//!   with barriers governed by fast-write mode
//! - Fatal handling for storage faults that leave a commit half done
//! - A dbm-style fetch accessor that lends out a handle-owned buffer
//!
//! ## Crash consistency
//!
//! An open trusts only the header. Split buckets and a doubled directory go
//! to freshly allocated blocks, and the header naming them is written last,
//! so a crash at any point leaves a file that opens to the last completed
//! commit (or to a later one whose header made it out).
//!
//! ## Example
//!
//! ```rust
//! use hashdb_core::{Config, Database, StoreMode};
//! use hashdb_storage::InMemoryBackend;
//!
//! let mut db = Database::open_with_backend(
//!     Config::new().block_size(512),
//!     Box::new(InMemoryBackend::new()),
//! )
//! .unwrap();
//!
//! db.store(b"alpha", b"1", StoreMode::Replace).unwrap();
//! assert_eq!(db.compat_fetch(b"alpha").unwrap(), Some(&b"1"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod cache;
mod compat;
mod config;
mod database;
mod directory;
mod error;
mod fatal;
mod hash;
mod header;
mod io;
mod update;

pub use bucket::{max_entry_len, Bucket, BucketEntry};
pub use config::{Config, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use database::{Database, DatabaseStats, StoreMode};
pub use directory::{Directory, MAX_DIR_BITS};
pub use error::{CoreError, CoreResult};
pub use fatal::{
    terminate, FatalHandler, FaultKind, StorageFault, FATAL_EXIT_CODE, FATAL_PREFIX,
};
pub use hash::hash_key;
pub use header::{Header, FORMAT_VERSION, HEADER_LEN, HEADER_MAGIC};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
