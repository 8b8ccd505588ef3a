//! File handles backed by OS files.

use crate::error::{classify, io_error, EnvError, EnvResult};
use crate::file::{RandomAccessFile, SequentialFile, WritableFile};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reads into `buf` until it is full or `read` reports end of file.
fn fill<F>(buf: &mut [u8], mut read: F) -> io::Result<usize>
where
    F: FnMut(&mut [u8], usize) -> io::Result<usize>,
{
    let mut filled = 0;
    while filled < buf.len() {
        match read(&mut buf[filled..], filled) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A forward-only reader over an OS file.
#[derive(Debug)]
pub struct HostSequentialFile {
    filename: String,
    file: File,
}

impl HostSequentialFile {
    /// Opens `path` for sequential reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, `IoError` otherwise.
    pub fn open(path: &Path) -> EnvResult<Self> {
        let filename = path.to_string_lossy().into_owned();
        let file = File::open(path).map_err(|e| classify(filename.as_str(), e))?;
        tracing::debug!(path = %filename, "opened sequential file");
        Ok(Self { filename, file })
    }
}

impl SequentialFile for HostSequentialFile {
    fn read<'a>(&mut self, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]> {
        let len = n.min(scratch.len());
        let buf = &mut scratch[..len];
        let file = &mut self.file;
        let read = fill(buf, |chunk, _| file.read(chunk))
            .map_err(|e| io_error(self.filename.as_str(), e))?;
        Ok(&scratch[..read])
    }

    fn skip(&mut self, n: u64) -> EnvResult<()> {
        let delta = i64::try_from(n).map_err(|_| {
            EnvError::io(self.filename.as_str(), format!("skip of {n} bytes is out of range"))
        })?;
        self.file
            .seek(SeekFrom::Current(delta))
            .map_err(|e| io_error(self.filename.as_str(), e))?;
        Ok(())
    }
}

/// A positional reader over an OS file.
///
/// Uses `pread` on Unix and overlapped reads on Windows, so concurrent
/// reads at different offsets never interfere.
#[derive(Debug)]
pub struct HostRandomAccessFile {
    filename: String,
    file: File,
}

impl HostRandomAccessFile {
    /// Opens `path` for random-access reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, `IoError` otherwise.
    pub fn open(path: &Path) -> EnvResult<Self> {
        let filename = path.to_string_lossy().into_owned();
        let file = File::open(path).map_err(|e| classify(filename.as_str(), e))?;
        tracing::debug!(path = %filename, "opened random access file");
        Ok(Self { filename, file })
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }
}

impl RandomAccessFile for HostRandomAccessFile {
    fn read<'a>(&self, offset: u64, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]> {
        let len = n.min(scratch.len());
        let read = fill(&mut scratch[..len], |chunk, filled| {
            self.read_at(chunk, offset + filled as u64)
        })
        .map_err(|e| io_error(self.filename.as_str(), e))?;
        Ok(&scratch[..read])
    }
}

/// A write-only OS file in truncate or append mode.
///
/// In append mode the host positions every write at end of file
/// (`O_APPEND` / `FILE_APPEND_DATA`), so concurrent appenders in other
/// processes never overwrite each other.
#[derive(Debug)]
pub struct HostWritableFile {
    filename: String,
    file: Option<File>,
    append: bool,
}

impl HostWritableFile {
    /// Opens `path` for writing.
    ///
    /// With `append == false` the file is created or truncated. With
    /// `append == true` it is created if absent and all writes land at
    /// end of file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if a parent directory is missing, `IoError` otherwise.
    pub fn open(path: &Path, append: bool) -> EnvResult<Self> {
        let filename = path.to_string_lossy().into_owned();
        let mut options = OpenOptions::new();
        if append {
            options.append(true).create(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let file = options
            .open(path)
            .map_err(|e| classify(filename.as_str(), e))?;
        tracing::debug!(path = %filename, append, "opened writable file");
        Ok(Self {
            filename,
            file: Some(file),
            append,
        })
    }

    /// Returns true if the file was opened in append mode.
    #[must_use]
    pub fn is_append(&self) -> bool {
        self.append
    }

    fn file_mut(&mut self) -> EnvResult<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(EnvError::io(self.filename.as_str(), "file is closed")),
        }
    }
}

impl WritableFile for HostWritableFile {
    fn append(&mut self, data: &[u8]) -> EnvResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let context = format!("append {}", self.filename);
        let file = self.file_mut()?;
        // A single write keeps O_APPEND atomic; looping would interleave
        // with other appenders.
        let written = loop {
            match file.write(data) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error(context, e)),
            }
        };
        if written != data.len() {
            return Err(EnvError::io(
                context,
                format!("short write: {written} of {} bytes", data.len()),
            ));
        }
        Ok(())
    }

    fn flush(&mut self) -> EnvResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> EnvResult<()> {
        let context = format!("sync {}", self.filename);
        self.file_mut()?
            .sync_all()
            .map_err(|e| io_error(context, e))
    }

    fn close(&mut self) -> EnvResult<()> {
        // File reports no error on close; dropping it releases the handle.
        if self.file.take().is_some() {
            tracing::debug!(path = %self.filename, "closed writable file");
        }
        Ok(())
    }
}

impl Drop for HostWritableFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.filename, error = %e, "failed to close writable file");
        }
    }
}
