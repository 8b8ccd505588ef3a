//! The environment facade.
//!
//! [`Env`] is the single entry point the storage engine uses for files,
//! directories, locks, background work, logs and time. [`HostEnv`] is
//! the implementation over the host operating system and
//! [`default_env`] hands out the process-wide instance.

use crate::config::EnvConfig;
use crate::dir;
use crate::error::EnvResult;
use crate::file::{FileLock, RandomAccessFile, SequentialFile, WritableFile};
use crate::host::{HostRandomAccessFile, HostSequentialFile, HostWritableFile};
use crate::lock::HostFileLock;
use crate::logger::{FileLogger, Logger};
use crate::path::{process_base_dir, PathResolver};
use crate::scheduler::{spawn_detached, task, Job, ThreadPool};
use once_cell::sync::Lazy;
use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Operating-system services used by the storage engine.
///
/// All paths are caller strings; implementations resolve them before use.
/// Every fallible operation returns an [`EnvResult`]; a failed factory
/// call never yields a handle.
///
/// # Implementors
///
/// - [`HostEnv`] - the host file system and threads
/// - [`super::InMemoryEnv`] - an in-memory file system for tests
pub trait Env: Send + Sync + Debug {
    /// Opens `fname` for sequential reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, `IoError` otherwise.
    fn new_sequential_file(&self, fname: &str) -> EnvResult<Box<dyn SequentialFile>>;

    /// Opens `fname` for positional reads.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, `IoError` otherwise.
    fn new_random_access_file(&self, fname: &str) -> EnvResult<Box<dyn RandomAccessFile>>;

    /// Creates or truncates `fname` for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    fn new_writable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>>;

    /// Opens `fname` for appending, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    fn new_appendable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>>;

    /// Returns true if `fname` exists. Never fails.
    fn file_exists(&self, fname: &str) -> bool;

    /// Returns the names of the direct children of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the directory cannot be enumerated.
    fn get_children(&self, dir: &str) -> EnvResult<Vec<String>>;

    /// Deletes the file `fname`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist.
    fn delete_file(&self, fname: &str) -> EnvResult<()>;

    /// Creates `dirname` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created for any reason
    /// other than already existing.
    fn create_dir(&self, dirname: &str) -> EnvResult<()>;

    /// Deletes the empty directory `dirname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or not empty.
    fn delete_dir(&self, dirname: &str) -> EnvResult<()>;

    /// Returns the size of `fname` in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or queried.
    fn get_file_size(&self, fname: &str) -> EnvResult<u64>;

    /// Renames `src` to `target`, replacing `target` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn rename_file(&self, src: &str, target: &str) -> EnvResult<()>;

    /// Acquires an exclusive lock on `fname`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an `IoError` if the lock is already held, by any owner.
    fn lock_file(&self, fname: &str) -> EnvResult<Box<dyn FileLock>>;

    /// Releases a lock returned by [`Env::lock_file`].
    ///
    /// # Errors
    ///
    /// Implementations may report a failure to release.
    fn unlock_file(&self, lock: Box<dyn FileLock>) -> EnvResult<()> {
        drop(lock);
        Ok(())
    }

    /// Runs `job` once on a background worker, in no particular order.
    fn schedule(&self, job: Job);

    /// Runs `job` once on a new detached thread.
    fn start_thread(&self, job: Job);

    /// Returns a scratch directory for tests, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn get_test_directory(&self) -> EnvResult<String>;

    /// Creates an info logger writing to `fname`, truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created.
    fn new_logger(&self, fname: &str) -> EnvResult<Box<dyn Logger>>;

    /// Returns the current time in microseconds.
    fn now_micros(&self) -> u64 {
        wall_clock_micros()
    }

    /// Sleeps the calling thread for `micros` microseconds.
    fn sleep_for_micros(&self, micros: u64) {
        std::thread::sleep(Duration::from_micros(micros));
    }

    /// Returns the host page size or allocation granularity, whichever
    /// is larger.
    fn page_size(&self) -> usize {
        page_size::get().max(page_size::get_granularity())
    }
}

/// Convenience helpers available on every [`Env`].
pub trait EnvExt: Env {
    /// Schedules `callback(arg)` on a background worker.
    fn schedule_fn<A>(&self, callback: fn(A), arg: A)
    where
        A: Send + 'static,
    {
        self.schedule(task(callback, arg));
    }

    /// Runs `callback(arg)` on a new detached thread.
    fn start_thread_fn<A>(&self, callback: fn(A), arg: A)
    where
        A: Send + 'static,
    {
        self.start_thread(task(callback, arg));
    }

    /// Writes `data` to `fname`, replacing its contents.
    ///
    /// On failure the partially written file is deleted.
    ///
    /// # Errors
    ///
    /// Returns the first error from creating, writing, syncing or closing.
    fn write_string_to_file(&self, data: &[u8], fname: &str, sync: bool) -> EnvResult<()> {
        let mut file = self.new_writable_file(fname)?;
        let result = file
            .append(data)
            .and_then(|()| if sync { file.sync() } else { Ok(()) })
            .and_then(|()| file.close());
        drop(file);
        if result.is_err() {
            if let Err(e) = self.delete_file(fname) {
                tracing::debug!(path = fname, error = %e, "failed to remove partial file");
            }
        }
        result
    }

    /// Reads the whole of `fname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    fn read_file_to_vec(&self, fname: &str) -> EnvResult<Vec<u8>> {
        const CHUNK: usize = 8192;
        let mut file = self.new_sequential_file(fname)?;
        let mut scratch = vec![0u8; CHUNK];
        let mut data = Vec::new();
        loop {
            let chunk = file.read(CHUNK, &mut scratch)?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(chunk);
        }
        Ok(data)
    }
}

impl<E: Env + ?Sized> EnvExt for E {}

/// Microseconds since the Unix epoch.
pub(crate) fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// The environment backed by the host operating system.
///
/// # Example
///
/// ```no_run
/// use stratum_env::{Env, EnvExt, HostEnv};
///
/// let env = HostEnv::new();
/// env.create_dir("data/db").unwrap();
/// env.write_string_to_file(b"MANIFEST-000001\n", "data/db/CURRENT", true).unwrap();
/// assert!(env.file_exists("data/db/CURRENT"));
/// ```
#[derive(Debug)]
pub struct HostEnv {
    config: EnvConfig,
    resolver: PathResolver,
    pool: ThreadPool,
}

impl HostEnv {
    /// Creates an environment with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EnvConfig::default())
    }

    /// Creates an environment with the given configuration.
    #[must_use]
    pub fn with_config(config: EnvConfig) -> Self {
        let base_dir = config
            .base_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_else(|| process_base_dir().to_string());
        let resolver = PathResolver::new(base_dir, config.anchor_rooted_paths);
        let pool = ThreadPool::new(config.thread_name_prefix.clone(), config.worker_count());
        Self {
            config,
            resolver,
            pool,
        }
    }

    /// Returns the configuration this environment was built with.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Returns the path resolver.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}

impl Default for HostEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for HostEnv {
    fn new_sequential_file(&self, fname: &str) -> EnvResult<Box<dyn SequentialFile>> {
        let file = HostSequentialFile::open(&self.resolver.resolve(fname))?;
        Ok(Box::new(file))
    }

    fn new_random_access_file(&self, fname: &str) -> EnvResult<Box<dyn RandomAccessFile>> {
        let file = HostRandomAccessFile::open(&self.resolver.resolve(fname))?;
        Ok(Box::new(file))
    }

    fn new_writable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
        let file = HostWritableFile::open(&self.resolver.resolve(fname), false)?;
        Ok(Box::new(file))
    }

    fn new_appendable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
        let file = HostWritableFile::open(&self.resolver.resolve(fname), true)?;
        Ok(Box::new(file))
    }

    fn file_exists(&self, fname: &str) -> bool {
        dir::exists(&self.resolver.resolve(fname))
    }

    fn get_children(&self, dirname: &str) -> EnvResult<Vec<String>> {
        dir::children(&self.resolver.resolve(dirname))
    }

    fn delete_file(&self, fname: &str) -> EnvResult<()> {
        dir::remove_file(&self.resolver.resolve(fname))
    }

    fn create_dir(&self, dirname: &str) -> EnvResult<()> {
        dir::create_dir_all(&self.resolver.resolve(dirname))
    }

    fn delete_dir(&self, dirname: &str) -> EnvResult<()> {
        dir::remove_dir(&self.resolver.resolve(dirname))
    }

    fn get_file_size(&self, fname: &str) -> EnvResult<u64> {
        dir::file_size(&self.resolver.resolve(fname))
    }

    fn rename_file(&self, src: &str, target: &str) -> EnvResult<()> {
        dir::rename(&self.resolver.resolve(src), &self.resolver.resolve(target))
    }

    fn lock_file(&self, fname: &str) -> EnvResult<Box<dyn FileLock>> {
        let lock = HostFileLock::acquire(&self.resolver.resolve(fname))?;
        Ok(Box::new(lock))
    }

    fn schedule(&self, job: Job) {
        self.pool.execute(job);
    }

    fn start_thread(&self, job: Job) {
        spawn_detached(&self.config.thread_name_prefix, job);
    }

    fn get_test_directory(&self) -> EnvResult<String> {
        let test_dir = std::env::temp_dir()
            .join(&self.config.test_dir_name)
            .join("test");
        dir::create_dir_all(&test_dir)?;
        Ok(test_dir.to_string_lossy().into_owned())
    }

    fn new_logger(&self, fname: &str) -> EnvResult<Box<dyn Logger>> {
        let file = HostWritableFile::open(&self.resolver.resolve(fname), false)?;
        Ok(Box::new(FileLogger::new(
            Box::new(file),
            self.config.log_buffer_size,
            self.config.log_max_buffer_size,
        )))
    }
}

static DEFAULT_ENV: Lazy<HostEnv> = Lazy::new(|| {
    tracing::debug!("initializing default environment");
    HostEnv::new()
});

/// Returns the process-wide host environment.
///
/// Constructed on first call, exactly once even under concurrent first
/// access, and never dropped before process exit.
pub fn default_env() -> &'static HostEnv {
    &DEFAULT_ENV
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_log;
    use crate::error::ErrorKind;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn writable_then_sequential_round_trip() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let fname = path_in(&dir, "000001.log");

        env.write_string_to_file(b"record one\nrecord two\n", &fname, true)
            .unwrap();
        assert_eq!(env.read_file_to_vec(&fname).unwrap(), b"record one\nrecord two\n");
        assert_eq!(env.get_file_size(&fname).unwrap(), 22);
    }

    #[test]
    fn appendable_file_extends() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let fname = path_in(&dir, "LOG");

        env.write_string_to_file(b"ab", &fname, false).unwrap();
        let mut file = env.new_appendable_file(&fname).unwrap();
        file.append(b"cd").unwrap();
        file.close().unwrap();

        assert_eq!(env.read_file_to_vec(&fname).unwrap(), b"abcd");
    }

    #[test]
    fn failed_open_returns_no_handle() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();

        let err = env.new_sequential_file(&path_in(&dir, "missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(env.new_random_access_file(&path_in(&dir, "missing")).is_err());
    }

    #[test]
    fn lock_unlock_relock() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let fname = path_in(&dir, "LOCK");

        let lock = env.lock_file(&fname).unwrap();
        let err = env.lock_file(&fname).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        env.unlock_file(lock).unwrap();
        let _lock = env.lock_file(&fname).unwrap();
    }

    #[test]
    fn directory_lifecycle() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let root = path_in(&dir, "a/b/c");

        env.create_dir(&root).unwrap();
        env.create_dir(&root).unwrap();
        for name in ["x", "y", "z"] {
            env.write_string_to_file(b"", &format!("{root}/{name}"), false)
                .unwrap();
        }
        let mut children = env.get_children(&root).unwrap();
        children.sort();
        assert_eq!(children, vec!["x", "y", "z"]);

        assert!(env.delete_dir(&root).is_err());
        for name in ["x", "y", "z"] {
            env.delete_file(&format!("{root}/{name}")).unwrap();
        }
        env.delete_dir(&root).unwrap();
        assert!(!env.file_exists(&root));
        assert!(env.file_exists(&path_in(&dir, "a/b")));
    }

    #[test]
    fn rename_over_existing() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let tmp = path_in(&dir, "CURRENT.tmp");
        let current = path_in(&dir, "CURRENT");

        env.write_string_to_file(b"MANIFEST-000001\n", &current, false).unwrap();
        env.write_string_to_file(b"MANIFEST-000002\n", &tmp, false).unwrap();
        env.rename_file(&tmp, &current).unwrap();

        assert!(!env.file_exists(&tmp));
        assert_eq!(env.read_file_to_vec(&current).unwrap(), b"MANIFEST-000002\n");
    }

    #[test]
    fn schedule_runs_jobs() {
        let env = HostEnv::with_config(EnvConfig::new().background_threads(2));
        let (tx, rx) = mpsc::channel();

        fn send(arg: (mpsc::Sender<u32>, u32)) {
            let (tx, value) = arg;
            tx.send(value).unwrap();
        }
        for i in 0..10 {
            env.schedule_fn(send, (tx.clone(), i));
        }

        let mut got: Vec<u32> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort_unstable();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn start_thread_runs_once() {
        let env = HostEnv::new();
        let (tx, rx) = mpsc::channel();
        env.start_thread(Box::new(move || tx.send(thread::current().id()).unwrap()));

        let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(id, thread::current().id());
    }

    #[test]
    fn logger_writes_records() {
        let dir = tempdir().unwrap();
        let env = HostEnv::new();
        let fname = path_in(&dir, "LOG");

        let logger = env.new_logger(&fname).unwrap();
        env_log!(logger, "opening db {}", "test");
        env_log!(logger, "{}", "x".repeat(10_000));
        drop(logger);

        let text = String::from_utf8(env.read_file_to_vec(&fname).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" opening db test"));
        assert!(lines[1].ends_with(&"x".repeat(10_000)));
    }

    #[test]
    fn test_directory_exists() {
        let env = HostEnv::with_config(EnvConfig::new().test_dir_name("stratum-env-unit"));
        let dir = env.get_test_directory().unwrap();
        assert!(env.file_exists(&dir));
        assert!(dir.contains("stratum-env-unit"));
    }

    #[test]
    fn time_and_page_size() {
        let env = HostEnv::new();
        let before = env.now_micros();
        env.sleep_for_micros(2_000);
        assert!(env.now_micros() >= before + 1_000);
        assert!(env.page_size() >= 512);
        assert!(env.page_size().is_power_of_two());
    }

    #[test]
    fn default_env_is_shared() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| default_env() as *const HostEnv as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.iter().all(|&a| a == addrs[0]));
        assert_eq!(addrs[0], default_env() as *const HostEnv as usize);
    }

    /// An in-memory env whose writable files reject every append.
    #[derive(Debug)]
    struct RejectingEnv {
        inner: crate::InMemoryEnv,
        create_files: bool,
    }

    impl Default for RejectingEnv {
        fn default() -> Self {
            Self {
                inner: crate::InMemoryEnv::new(),
                create_files: true,
            }
        }
    }

    #[derive(Debug)]
    struct RejectingFile;

    impl WritableFile for RejectingFile {
        fn append(&mut self, _data: &[u8]) -> EnvResult<()> {
            Err(crate::EnvError::io("CURRENT", "disk full"))
        }
        fn flush(&mut self) -> EnvResult<()> {
            Ok(())
        }
        fn sync(&mut self) -> EnvResult<()> {
            Ok(())
        }
        fn close(&mut self) -> EnvResult<()> {
            Ok(())
        }
    }

    impl Env for RejectingEnv {
        fn new_sequential_file(&self, fname: &str) -> EnvResult<Box<dyn SequentialFile>> {
            self.inner.new_sequential_file(fname)
        }
        fn new_random_access_file(&self, fname: &str) -> EnvResult<Box<dyn RandomAccessFile>> {
            self.inner.new_random_access_file(fname)
        }
        fn new_writable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
            if self.create_files {
                self.inner.new_writable_file(fname)?;
            }
            Ok(Box::new(RejectingFile))
        }
        fn new_appendable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
            self.new_writable_file(fname)
        }
        fn file_exists(&self, fname: &str) -> bool {
            self.inner.file_exists(fname)
        }
        fn get_children(&self, dir: &str) -> EnvResult<Vec<String>> {
            self.inner.get_children(dir)
        }
        fn delete_file(&self, fname: &str) -> EnvResult<()> {
            self.inner.delete_file(fname)
        }
        fn create_dir(&self, dirname: &str) -> EnvResult<()> {
            self.inner.create_dir(dirname)
        }
        fn delete_dir(&self, dirname: &str) -> EnvResult<()> {
            self.inner.delete_dir(dirname)
        }
        fn get_file_size(&self, fname: &str) -> EnvResult<u64> {
            self.inner.get_file_size(fname)
        }
        fn rename_file(&self, src: &str, target: &str) -> EnvResult<()> {
            self.inner.rename_file(src, target)
        }
        fn lock_file(&self, fname: &str) -> EnvResult<Box<dyn FileLock>> {
            self.inner.lock_file(fname)
        }
        fn schedule(&self, job: Job) {
            self.inner.schedule(job);
        }
        fn start_thread(&self, job: Job) {
            self.inner.start_thread(job);
        }
        fn get_test_directory(&self) -> EnvResult<String> {
            self.inner.get_test_directory()
        }
        fn new_logger(&self, fname: &str) -> EnvResult<Box<dyn Logger>> {
            self.inner.new_logger(fname)
        }
    }

    #[test]
    fn failed_write_removes_partial_file() {
        let env = RejectingEnv::default();

        let err = env
            .write_string_to_file(b"MANIFEST-000002\n", "/db/CURRENT", true)
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(!env.file_exists("/db/CURRENT"));
    }

    #[test]
    fn failed_cleanup_keeps_original_error() {
        let env = RejectingEnv {
            create_files: false,
            ..RejectingEnv::default()
        };

        // Nothing was created, so the cleanup delete fails with NotFound.
        let err = env
            .write_string_to_file(b"x", "/db/CURRENT", false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn anchored_env_resolves_rooted_paths() {
        let dir = tempdir().unwrap();
        let env = HostEnv::with_config(
            EnvConfig::new()
                .base_dir(dir.path())
                .anchor_rooted_paths(true),
        );

        env.create_dir("/db").unwrap();
        env.write_string_to_file(b"x", "/db/CURRENT", false).unwrap();
        assert!(dir.path().join("db").join("CURRENT").exists());
        assert_eq!(env.get_file_size("/db/CURRENT").unwrap(), 1);
    }
}
