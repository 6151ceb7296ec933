//! Database configuration.

use crate::error::{CoreError, CoreResult};
use crate::fatal::FatalHandler;
use crate::header::HEADER_LEN;
use std::fmt;
use std::sync::Arc;

/// Smallest block size accepted for new databases.
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Largest block size accepted; the initial directory is one block.
pub const MAX_BLOCK_SIZE: u32 = 1 << 20;

/// Configuration for opening a database.
#[derive(Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Open for reading only, under a shared lock.
    pub read_only: bool,

    /// Block size for new databases; also the bucket size.
    ///
    /// Ignored when opening an existing file, whose header is authoritative.
    pub block_size: u32,

    /// Number of buckets kept in memory.
    pub cache_size: usize,

    /// Defer durability barriers on ordinary commits.
    ///
    /// With fast write on, a commit that does not touch the header issues no
    /// sync, widening the window a crash can lose. A mapped view overrides
    /// this.
    pub fast_write: bool,

    /// Attach a memory-mapped read view to the file.
    pub memory_map: bool,

    /// Called with the message of an unrecoverable fault before exiting.
    pub fatal_handler: Option<FatalHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            read_only: false,
            block_size: 4096,
            cache_size: 32,
            fast_write: false,
            memory_map: false,
            fatal_handler: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("read_only", &self.read_only)
            .field("block_size", &self.block_size)
            .field("cache_size", &self.cache_size)
            .field("fast_write", &self.fast_write)
            .field("memory_map", &self.memory_map)
            .field("fatal_handler", &self.fatal_handler.is_some())
            .finish()
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the block size used when creating a database.
    #[must_use]
    pub const fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the number of cached buckets.
    #[must_use]
    pub const fn cache_size(mut self, slots: usize) -> Self {
        self.cache_size = slots;
        self
    }

    /// Sets fast-write mode.
    #[must_use]
    pub const fn fast_write(mut self, value: bool) -> Self {
        self.fast_write = value;
        self
    }

    /// Sets whether to attach a memory-mapped view.
    #[must_use]
    pub const fn memory_map(mut self, value: bool) -> Self {
        self.memory_map = value;
        self
    }

    /// Installs a fatal-error handler.
    #[must_use]
    pub fn fatal_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.fatal_handler = Some(Arc::new(handler));
        self
    }

    /// Checks the values a new or reopened handle depends on.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the block size is not a power of two
    /// between [`MIN_BLOCK_SIZE`] and [`MAX_BLOCK_SIZE`], or the cache holds
    /// fewer than two buckets (a split needs both halves resident).
    pub fn validate(&self) -> CoreResult<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
            || !self.block_size.is_power_of_two()
        {
            return Err(CoreError::invalid_config(format!(
                "block size {} must be a power of two in {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        debug_assert!(self.block_size as usize >= HEADER_LEN);
        if self.cache_size < 2 {
            return Err(CoreError::invalid_config(format!(
                "cache size {} must be at least 2",
                self.cache_size
            )));
        }
        Ok(())
    }
}
