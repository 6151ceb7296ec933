//! # hashdb Storage
//!
//! Positioned block storage for hashdb.
//!
//! This crate provides the lowest-level storage abstraction for hashdb.
//! Storage backends are **opaque byte stores** - they do not interpret
//! the blocks they hold.
//!
//! ## Design Principles
//!
//! - Backends expose a cursor: `seek` reports where it landed, `write`
//!   reports how many bytes it wrote, so callers can verify both
//! - `sync` is the durability barrier; nothing else promises persistence
//! - No knowledge of headers, directories or buckets
//! - Must be `Send` so a handle can move between threads
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs, with an
//!   optional memory-mapped read view
//!
//! ## Example
//!
//! ```rust
//! use hashdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.seek(4).unwrap();
//! assert_eq!(backend.write(b"hello").unwrap(), 5);
//! assert_eq!(backend.read_at(4, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, LockMode};
pub use memory::InMemoryBackend;
