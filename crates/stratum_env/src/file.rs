//! File handle traits.
//!
//! Each handle type has a narrow capability set. Implementations own
//! exactly one underlying handle, released when the value is dropped.
//!
//! # Implementors
//!
//! - [`super::host`] - handles backed by OS files
//! - [`super::memory`] - handles backed by in-memory buffers

use crate::error::EnvResult;
use std::fmt::Debug;

/// A forward-only reader with a cursor maintained by the host.
///
/// Not designed for concurrent use; callers sharing one instance across
/// threads must synchronize externally.
pub trait SequentialFile: Send + Debug {
    /// Reads up to `n` bytes into `scratch` and returns the bytes read.
    ///
    /// At most `min(n, scratch.len())` bytes are read. The returned slice
    /// is shorter than requested only at end of file; an empty slice
    /// means end of file.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the host read fails.
    fn read<'a>(&mut self, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]>;

    /// Advances the cursor by `n` bytes without reading them.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the host rejects the seek.
    fn skip(&mut self, n: u64) -> EnvResult<()>;
}

/// A positional reader.
///
/// Reads never move a shared cursor, so one instance may serve concurrent
/// reads at independent offsets from many threads.
pub trait RandomAccessFile: Send + Sync + Debug {
    /// Reads up to `n` bytes starting at `offset` into `scratch`.
    ///
    /// Returns fewer than `n` bytes only at end of file.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the host read fails.
    fn read<'a>(&self, offset: u64, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]>;
}

/// A write-only file opened in truncate or append mode.
///
/// The mode is fixed when the file is opened.
pub trait WritableFile: Send + Debug {
    /// Writes all of `data` or fails.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the write fails, writes fewer bytes than
    /// requested, or the file has been closed.
    fn append(&mut self, data: &[u8]) -> EnvResult<()>;

    /// Makes appended bytes visible to readers of the same file.
    ///
    /// No application-level buffering is done, so this does not touch
    /// the host.
    ///
    /// # Errors
    ///
    /// Implementations that buffer may return an `IoError`.
    fn flush(&mut self) -> EnvResult<()>;

    /// Forces all prior writes to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if durability cannot be confirmed.
    fn sync(&mut self) -> EnvResult<()>;

    /// Closes the file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the host reports a failure while closing.
    fn close(&mut self) -> EnvResult<()>;
}

/// An exclusively held advisory lock.
///
/// Dropping the token releases the lock.
pub trait FileLock: Send + Debug {
    /// Returns the resolved path of the lock file.
    fn path(&self) -> &str;
}
