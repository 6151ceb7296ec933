//! Fetch accessor with a handle-owned result buffer.
//!
//! Callers written against the classic dbm interface get back a pointer they
//! never free and that stays valid only until the next fetch. Here the handle
//! keeps the most recent result and lends it out; the borrow ends at the next
//! `&mut self` call, which is exactly when the buffer is released.

use crate::database::Database;
use crate::error::CoreResult;

impl Database {
    /// Looks up `key`, returning a view into a buffer owned by the handle.
    ///
    /// The buffer from the previous call is released first, whether or not
    /// this call finds the key and also when it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if a bucket cannot be read or decoded.
    pub fn compat_fetch(&mut self, key: &[u8]) -> CoreResult<Option<&[u8]>> {
        let fetched = self.fetch(key);
        self.fetch_slot = None;
        self.fetch_slot = fetched?;
        Ok(self.fetch_slot.as_deref())
    }
}
