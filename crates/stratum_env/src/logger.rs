//! Diagnostic info logs.
//!
//! Each call produces one line:
//!
//! ```text
//! 2026/10/15-09:41:07.123456 1f compacted 4 files
//! ```
//!
//! Records are formatted in at most two passes. The first uses a small
//! stack buffer; if the record does not fit, it is formatted again into a
//! larger heap buffer and truncated if it still does not fit. Worst-case
//! memory per call is therefore bounded by the large buffer size.

use crate::file::WritableFile;
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Upper bound on the first-pass buffer, which lives on the stack.
const STACK_BUFFER_LIMIT: usize = 1024;

/// A sink for diagnostic messages.
///
/// Logging is best effort: failures are never reported to the caller.
pub trait Logger: Send + Sync + std::fmt::Debug {
    /// Writes one formatted record.
    fn logv(&self, args: fmt::Arguments<'_>);
}

/// Logs a formatted message to a [`Logger`].
///
/// ```rust
/// use stratum_env::{env_log, Env, InMemoryEnv};
///
/// let env = InMemoryEnv::new();
/// let logger = env.new_logger("/db/LOG").unwrap();
/// env_log!(logger, "recovered {} log files", 3);
/// ```
#[macro_export]
macro_rules! env_log {
    ($logger:expr, $($arg:tt)+) => {{
        #[allow(unused_imports)]
        use $crate::Logger as _;
        $logger.logv(format_args!($($arg)+))
    }};
}

/// Returns a small numeric identifier for the calling thread.
pub fn current_thread_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

/// A logger that appends records to a [`WritableFile`].
#[derive(Debug)]
pub struct FileLogger {
    file: Mutex<Box<dyn WritableFile>>,
    buffer_size: usize,
    max_buffer_size: usize,
}

impl FileLogger {
    /// Creates a logger over `file` with the given pass-one and pass-two
    /// buffer sizes.
    pub fn new(file: Box<dyn WritableFile>, buffer_size: usize, max_buffer_size: usize) -> Self {
        let buffer_size = buffer_size.clamp(2, STACK_BUFFER_LIMIT);
        Self {
            file: Mutex::new(file),
            buffer_size,
            max_buffer_size: max_buffer_size.max(buffer_size),
        }
    }

    fn write_record(&self, record: &[u8]) {
        let mut file = self.file.lock();
        if let Err(e) = file.append(record).and_then(|()| file.flush()) {
            tracing::debug!(error = %e, "dropped info log record");
        }
    }
}

impl Logger for FileLogger {
    fn logv(&self, args: fmt::Arguments<'_>) {
        let header = RecordHeader::now();

        let mut stack = [0u8; STACK_BUFFER_LIMIT];
        if let Some(len) = format_record(&mut stack[..self.buffer_size], &header, args, false) {
            self.write_record(&stack[..len]);
            return;
        }

        let mut heap = vec![0u8; self.max_buffer_size];
        if let Some(len) = format_record(&mut heap, &header, args, true) {
            self.write_record(&heap[..len]);
        }
    }
}

/// The timestamp and thread id prefix of a record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    time: OffsetDateTime,
    thread_id: u64,
}

impl RecordHeader {
    fn now() -> Self {
        Self {
            time: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            thread_id: current_thread_id(),
        }
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.time;
        write!(
            f,
            "{:04}/{:02}/{:02}-{:02}:{:02}:{:02}.{:06} {:x}",
            t.year(),
            u8::from(t.month()),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
            t.microsecond(),
            self.thread_id
        )
    }
}

/// Copies formatted text into a fixed buffer, flagging overflow.
struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    overflowed: bool,
}

impl fmt::Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let bytes = s.as_bytes();
        if bytes.len() > room {
            self.buf[self.len..].copy_from_slice(&bytes[..room]);
            self.len = self.buf.len();
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Formats one newline-terminated record into `buf`.
///
/// Returns the record length, or `None` if the record overflowed and
/// `truncate` is false. One byte is always kept free for the newline.
pub(crate) fn format_record(
    buf: &mut [u8],
    header: &RecordHeader,
    args: fmt::Arguments<'_>,
    truncate: bool,
) -> Option<usize> {
    let limit = buf.len().checked_sub(1)?;
    let mut writer = BoundedWriter {
        buf: &mut buf[..limit],
        len: 0,
        overflowed: false,
    };
    // A formatting error without overflow comes from a Display impl; keep
    // whatever was written.
    let _ = write!(writer, "{header} {args}");
    let (mut len, overflowed) = (writer.len, writer.overflowed);
    if overflowed && !truncate {
        return None;
    }
    if len == 0 || buf[len - 1] != b'\n' {
        buf[len] = b'\n';
        len += 1;
    }
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EnvError, EnvResult};
    use std::sync::Arc;

    #[derive(Debug, Default, Clone)]
    struct CaptureFile {
        records: Arc<Mutex<Vec<Vec<u8>>>>,
        flushes: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl WritableFile for CaptureFile {
        fn append(&mut self, data: &[u8]) -> EnvResult<()> {
            if self.fail {
                return Err(EnvError::io("LOG", "disk full"));
            }
            self.records.lock().push(data.to_vec());
            Ok(())
        }

        fn flush(&mut self) -> EnvResult<()> {
            *self.flushes.lock() += 1;
            Ok(())
        }

        fn sync(&mut self) -> EnvResult<()> {
            Ok(())
        }

        fn close(&mut self) -> EnvResult<()> {
            Ok(())
        }
    }

    fn capture_logger(small: usize, large: usize) -> (FileLogger, CaptureFile) {
        let capture = CaptureFile::default();
        let logger = FileLogger::new(Box::new(capture.clone()), small, large);
        (logger, capture)
    }

    fn header() -> RecordHeader {
        RecordHeader {
            time: OffsetDateTime::UNIX_EPOCH,
            thread_id: 0x2a,
        }
    }

    #[test]
    fn header_format() {
        assert_eq!(header().to_string(), "1970/01/01-00:00:00.000000 2a");
    }

    #[test]
    fn record_gets_single_newline() {
        let mut buf = [0u8; 128];
        let len = format_record(&mut buf, &header(), format_args!("opened {}", "db"), false).unwrap();
        assert_eq!(&buf[..len], b"1970/01/01-00:00:00.000000 2a opened db\n");

        let len = format_record(&mut buf, &header(), format_args!("done\n"), false).unwrap();
        assert_eq!(&buf[..len], b"1970/01/01-00:00:00.000000 2a done\n");
    }

    #[test]
    fn overflow_without_truncate_is_none() {
        let mut buf = [0u8; 40];
        assert!(format_record(&mut buf, &header(), format_args!("{}", "x".repeat(40)), false).is_none());
    }

    #[test]
    fn overflow_with_truncate_fills_buffer() {
        let mut buf = [0u8; 40];
        let len = format_record(&mut buf, &header(), format_args!("{}", "x".repeat(40)), true).unwrap();
        assert_eq!(len, 40);
        assert_eq!(buf[39], b'\n');
    }

    #[test]
    fn short_message_uses_one_record() {
        let (logger, capture) = capture_logger(500, 30_000);
        env_log!(logger, "level {} compaction", 0);

        let records = capture.records.lock();
        assert_eq!(records.len(), 1);
        let line = String::from_utf8(records[0].clone()).unwrap();
        assert!(line.ends_with(" level 0 compaction\n"));
        assert_eq!(*capture.flushes.lock(), 1);
    }

    #[test]
    fn long_message_takes_second_pass_untruncated() {
        let (logger, capture) = capture_logger(500, 30_000);
        let message = "m".repeat(10_000);
        env_log!(logger, "{message}");

        let records = capture.records.lock();
        assert_eq!(records.len(), 1);
        let line = std::str::from_utf8(&records[0]).unwrap();
        assert!(line.ends_with(&format!("{message}\n")));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn huge_message_is_truncated_and_next_record_intact() {
        let (logger, capture) = capture_logger(500, 30_000);
        env_log!(logger, "{}", "h".repeat(100_000));
        env_log!(logger, "after");

        let records = capture.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), 30_000);
        assert_eq!(records[0].last(), Some(&b'\n'));
        assert!(records[1].ends_with(b" after\n"));
    }

    #[test]
    fn write_failures_are_swallowed() {
        let capture = CaptureFile {
            fail: true,
            ..CaptureFile::default()
        };
        let logger = FileLogger::new(Box::new(capture.clone()), 500, 30_000);
        env_log!(logger, "ignored");
        assert!(capture.records.lock().is_empty());
    }

    #[test]
    fn thread_ids_differ_across_threads() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }
}
