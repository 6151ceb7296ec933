//! # hashdb Testkit
//!
//! Test utilities for hashdb.
//!
//! This crate provides:
//! - A recording backend that logs every seek, write and sync, for asserting
//!   commit order and durability barriers
//! - A fault-injecting backend for short writes, misplaced seeks and failed
//!   syncs
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use hashdb_testkit::prelude::*;
//! use hashdb_storage::StorageBackend;
//!
//! let mut backend = RecordingBackend::new();
//! let log = backend.log();
//! backend.seek(0).unwrap();
//! backend.write(b"abc").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(log.writes(), vec![(0, 3)]);
//! assert_eq!(log.sync_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
}

pub use faults::*;
pub use generators::*;
pub use recording::*;
