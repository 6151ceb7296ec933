//! Unrecoverable write-path faults.
//!
//! hashdb writes blocks in place. Once a write has landed short or at the
//! wrong offset, the file may hold a half-written bucket or directory and
//! there is nothing to roll back to. Such faults are therefore never handed
//! back to the caller of a commit: they are carried as [`StorageFault`]
//! values inside the crate and end in [`terminate`], which reports the
//! fault and stops the process.
//!
//! A caller can install a [`FatalHandler`] to observe the message first
//! (flush its own logs, release external resources). If the handler
//! returns, the process still exits with status 1.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

/// Prefix written to stderr before the fault message.
pub const FATAL_PREFIX: &str = "hashdb fatal: ";

/// Exit status used when a fault terminates the process.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Callback invoked with the fault message before the process exits.
pub type FatalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Which write-path step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The cursor did not land on the requested offset.
    Seek,
    /// Fewer bytes were written than requested.
    Write,
    /// A durability barrier failed.
    Sync,
}

impl FaultKind {
    /// Fixed message reported for this kind of fault.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Seek => "lseek error",
            Self::Write => "write error",
            Self::Sync => "fsync error",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A fault on the write path that leaves the file in an unknown state.
///
/// `Display` yields only the fixed message (`"lseek error"`, `"write
/// error"`, `"fsync error"`); the offset and detail are kept for logging.
#[derive(Debug, Error)]
#[error("{kind}")]
#[must_use]
pub struct StorageFault {
    kind: FaultKind,
    offset: u64,
    detail: String,
}

impl StorageFault {
    /// Creates a fault of `kind` at `offset`.
    pub fn new(kind: FaultKind, offset: u64, detail: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            detail: detail.into(),
        }
    }

    /// Returns the failed step.
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the file offset being written when the fault occurred.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the diagnostic detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Reports an unrecoverable fault and exits the process.
///
/// With a handler installed the handler receives `message` and nothing is
/// written to stderr. Without one, `FATAL_PREFIX`, `message` and a newline go
/// straight to the unbuffered stderr stream. Either way the process then
/// exits with [`FATAL_EXIT_CODE`].
pub fn terminate(handler: Option<&FatalHandler>, message: &str) -> ! {
    match handler {
        Some(handler) => handler(message),
        None => {
            let line = format!("{FATAL_PREFIX}{message}\n");
            let _ = std::io::stderr().lock().write_all(line.as_bytes());
        }
    }
    std::process::exit(FATAL_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;

    #[test]
    fn fault_messages_are_fixed() {
        assert_eq!(FaultKind::Seek.message(), "lseek error");
        assert_eq!(FaultKind::Write.message(), "write error");
        assert_eq!(FaultKind::Sync.message(), "fsync error");
    }

    #[test]
    fn fault_display_hides_detail() {
        let fault = StorageFault::new(FaultKind::Write, 4096, "wrote 10 of 512 bytes");
        assert_eq!(fault.to_string(), "write error");
        assert_eq!(fault.offset(), 4096);
        assert_eq!(fault.detail(), "wrote 10 of 512 bytes");
        assert_eq!(fault.kind(), FaultKind::Write);
    }

    #[test]
    fn handler_receives_message() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let handler: FatalHandler = Arc::new(move |msg| {
            *sink.lock().unwrap() = msg.to_string();
            // Unwind instead of letting `terminate` exit the test process.
            panic!("fatal handler invoked");
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            terminate(Some(&handler), "lseek error");
        }));

        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), "lseek error");
    }
}
