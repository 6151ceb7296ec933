//! Durable-write primitive.
//!
//! Every byte hashdb puts into its file goes through [`write_block`]: seek,
//! confirm the landed position, write, confirm the count. Anything else is a
//! [`StorageFault`]. There are no retries; a short write or a misplaced seek
//! on a local file means the device is misbehaving.

use crate::fatal::{FaultKind, StorageFault};
use hashdb_storage::StorageBackend;

/// Writes `data` at `offset`.
///
/// # Errors
///
/// Returns a `Seek` fault if the cursor does not land on `offset` and a
/// `Write` fault if fewer than `data.len()` bytes are written.
pub fn write_block(
    storage: &mut dyn StorageBackend,
    offset: u64,
    data: &[u8],
) -> Result<(), StorageFault> {
    match storage.seek(offset) {
        Ok(landed) if landed == offset => {}
        Ok(landed) => {
            return Err(StorageFault::new(
                FaultKind::Seek,
                offset,
                format!("cursor landed at {landed}"),
            ))
        }
        Err(e) => return Err(StorageFault::new(FaultKind::Seek, offset, e.to_string())),
    }

    match storage.write(data) {
        Ok(written) if written == data.len() => Ok(()),
        Ok(written) => Err(StorageFault::new(
            FaultKind::Write,
            offset,
            format!("wrote {written} of {} bytes", data.len()),
        )),
        Err(e) => Err(StorageFault::new(FaultKind::Write, offset, e.to_string())),
    }
}

/// Issues a durability barrier.
///
/// # Errors
///
/// Returns a `Sync` fault if the barrier fails.
pub fn sync(storage: &mut dyn StorageBackend) -> Result<(), StorageFault> {
    storage
        .sync()
        .map_err(|e| StorageFault::new(FaultKind::Sync, 0, e.to_string()))
}
