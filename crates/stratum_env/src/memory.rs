//! In-memory environment for testing.

use crate::config::EnvConfig;
use crate::env::Env;
use crate::error::{classify, EnvError, EnvResult};
use crate::file::{FileLock, RandomAccessFile, SequentialFile, WritableFile};
use crate::lock::LOCK_HELD_MESSAGE;
use crate::logger::{FileLogger, Logger};
use crate::path::{PathResolver, ALT_SEPARATOR};
use crate::scheduler::{spawn_detached, Job, ThreadPool};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

type FileData = Arc<RwLock<Vec<u8>>>;

const SEPARATOR: char = ALT_SEPARATOR;

#[derive(Debug, Default)]
struct FileSystem {
    files: HashMap<String, FileData>,
    dirs: HashSet<String>,
}

impl FileSystem {
    fn entries(&self) -> impl Iterator<Item = &String> {
        self.files.keys().chain(self.dirs.iter())
    }

    /// Returns true if any file or directory lies beneath `dir`, at any depth.
    fn has_children(&self, dir: &str) -> bool {
        self.entries().any(|path| child_name(path, dir).is_some())
    }
}

/// Returns the first component of `path` below `dir`, if `path` is a
/// strict descendant of `dir`.
fn child_name<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(dir)?;
    let rest = if dir.ends_with(SEPARATOR) {
        rest
    } else {
        rest.strip_prefix(SEPARATOR)?
    };
    rest.split(SEPARATOR).next().filter(|name| !name.is_empty())
}

fn parent(path: &str) -> Option<&str> {
    match path.rfind(SEPARATOR) {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

fn not_found(context: &str) -> EnvError {
    classify(context, io::Error::from(io::ErrorKind::NotFound))
}

/// An environment whose file system lives entirely in memory.
///
/// Files, directories and locks are private to one instance. Background
/// work and logging behave as in [`super::HostEnv`]. Unlike the host,
/// files may be created without creating their parent directory first.
///
/// # Example
///
/// ```rust
/// use stratum_env::{Env, EnvExt, InMemoryEnv};
///
/// let env = InMemoryEnv::new();
/// env.write_string_to_file(b"hello", "/db/000001.log", false).unwrap();
/// assert_eq!(env.get_file_size("/db/000001.log").unwrap(), 5);
/// ```
#[derive(Debug)]
pub struct InMemoryEnv {
    config: EnvConfig,
    resolver: PathResolver,
    fs: Mutex<FileSystem>,
    locks: Arc<Mutex<HashSet<String>>>,
    pool: ThreadPool,
}

impl InMemoryEnv {
    /// Creates an empty in-memory environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EnvConfig::default())
    }

    /// Creates an empty in-memory environment with the given configuration.
    #[must_use]
    pub fn with_config(config: EnvConfig) -> Self {
        let base_dir = config
            .base_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resolver =
            PathResolver::with_separator(base_dir, SEPARATOR, config.anchor_rooted_paths);
        let pool = ThreadPool::new(config.thread_name_prefix.clone(), config.worker_count());
        Self {
            config,
            resolver,
            fs: Mutex::new(FileSystem::default()),
            locks: Arc::new(Mutex::new(HashSet::new())),
            pool,
        }
    }

    /// Returns a copy of the contents of `fname`, if it exists.
    #[must_use]
    pub fn file_contents(&self, fname: &str) -> Option<Vec<u8>> {
        let key = self.key(fname);
        self.fs.lock().files.get(&key).map(|data| data.read().clone())
    }

    fn key(&self, path: &str) -> String {
        let mut key = self.resolver.resolve_str(path);
        while key.len() > 1 && key.ends_with(SEPARATOR) {
            key.pop();
        }
        key
    }

    fn open_existing(&self, fname: &str) -> EnvResult<(String, FileData)> {
        let key = self.key(fname);
        let data = self.fs.lock().files.get(&key).cloned();
        match data {
            Some(data) => Ok((key, data)),
            None => Err(not_found(&key)),
        }
    }

    fn open_writable(&self, fname: &str, append: bool) -> EnvResult<MemWritableFile> {
        let key = self.key(fname);
        let mut fs = self.fs.lock();
        if fs.dirs.contains(&key) {
            return Err(EnvError::io(key, "is a directory"));
        }
        let data = Arc::clone(fs.files.entry(key.clone()).or_default());
        if !append {
            data.write().clear();
        }
        Ok(MemWritableFile {
            filename: key,
            data: Some(data),
        })
    }
}

impl Default for InMemoryEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for InMemoryEnv {
    fn new_sequential_file(&self, fname: &str) -> EnvResult<Box<dyn SequentialFile>> {
        let (filename, data) = self.open_existing(fname)?;
        Ok(Box::new(MemSequentialFile {
            filename,
            data,
            pos: 0,
        }))
    }

    fn new_random_access_file(&self, fname: &str) -> EnvResult<Box<dyn RandomAccessFile>> {
        let (_, data) = self.open_existing(fname)?;
        Ok(Box::new(MemRandomAccessFile { data }))
    }

    fn new_writable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
        Ok(Box::new(self.open_writable(fname, false)?))
    }

    fn new_appendable_file(&self, fname: &str) -> EnvResult<Box<dyn WritableFile>> {
        Ok(Box::new(self.open_writable(fname, true)?))
    }

    fn file_exists(&self, fname: &str) -> bool {
        let key = self.key(fname);
        let fs = self.fs.lock();
        fs.files.contains_key(&key) || fs.dirs.contains(&key)
    }

    fn get_children(&self, dirname: &str) -> EnvResult<Vec<String>> {
        let key = self.key(dirname);
        let fs = self.fs.lock();
        if !fs.dirs.contains(&key) && !fs.has_children(&key) {
            return Err(EnvError::io(key, "could not get children"));
        }
        let names: HashSet<&str> = fs
            .entries()
            .filter_map(|path| child_name(path, &key))
            .collect();
        Ok(names.into_iter().map(String::from).collect())
    }

    fn delete_file(&self, fname: &str) -> EnvResult<()> {
        let key = self.key(fname);
        match self.fs.lock().files.remove(&key) {
            Some(_) => Ok(()),
            None => Err(not_found(&key)),
        }
    }

    fn create_dir(&self, dirname: &str) -> EnvResult<()> {
        let key = self.key(dirname);
        let mut ancestors = Vec::new();
        let mut current = Some(key.as_str());
        while let Some(dir) = current {
            ancestors.push(dir);
            current = parent(dir);
        }

        let mut fs = self.fs.lock();
        if let Some(file) = ancestors.iter().find(|dir| fs.files.contains_key(**dir)) {
            return Err(EnvError::io(*file, "could not create directory: file exists"));
        }
        fs.dirs.extend(ancestors.into_iter().map(String::from));
        Ok(())
    }

    fn delete_dir(&self, dirname: &str) -> EnvResult<()> {
        let key = self.key(dirname);
        let mut fs = self.fs.lock();
        if !fs.dirs.contains(&key) {
            return Err(not_found(&key));
        }
        if fs.has_children(&key) {
            return Err(EnvError::io(key, "could not delete directory: not empty"));
        }
        fs.dirs.remove(&key);
        Ok(())
    }

    fn get_file_size(&self, fname: &str) -> EnvResult<u64> {
        let (_, data) = self.open_existing(fname)?;
        let len = data.read().len();
        Ok(len as u64)
    }

    fn rename_file(&self, src: &str, target: &str) -> EnvResult<()> {
        let (src, target) = (self.key(src), self.key(target));
        let mut fs = self.fs.lock();
        let data = fs.files.remove(&src).ok_or_else(|| not_found(&src))?;
        fs.files.insert(target, data);
        Ok(())
    }

    fn lock_file(&self, fname: &str) -> EnvResult<Box<dyn FileLock>> {
        let key = self.key(fname);
        if !self.locks.lock().insert(key.clone()) {
            return Err(EnvError::io(key, LOCK_HELD_MESSAGE));
        }
        self.fs.lock().files.entry(key.clone()).or_default();
        Ok(Box::new(MemFileLock {
            filename: key,
            locks: Arc::clone(&self.locks),
        }))
    }

    fn schedule(&self, job: Job) {
        self.pool.execute(job);
    }

    fn start_thread(&self, job: Job) {
        spawn_detached(&self.config.thread_name_prefix, job);
    }

    fn get_test_directory(&self) -> EnvResult<String> {
        let dir = format!("/{}/test", self.config.test_dir_name);
        self.create_dir(&dir)?;
        Ok(dir)
    }

    fn new_logger(&self, fname: &str) -> EnvResult<Box<dyn Logger>> {
        let file = self.open_writable(fname, false)?;
        Ok(Box::new(FileLogger::new(
            Box::new(file),
            self.config.log_buffer_size,
            self.config.log_max_buffer_size,
        )))
    }
}

#[derive(Debug)]
struct MemSequentialFile {
    filename: String,
    data: FileData,
    pos: u64,
}

impl SequentialFile for MemSequentialFile {
    fn read<'a>(&mut self, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]> {
        let data = self.data.read();
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(data.len());
        let len = n.min(scratch.len()).min(data.len() - start);
        scratch[..len].copy_from_slice(&data[start..start + len]);
        self.pos = (start + len) as u64;
        Ok(&scratch[..len])
    }

    fn skip(&mut self, n: u64) -> EnvResult<()> {
        self.pos = self.pos.checked_add(n).ok_or_else(|| {
            EnvError::io(self.filename.as_str(), format!("skip of {n} bytes is out of range"))
        })?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemRandomAccessFile {
    data: FileData,
}

impl RandomAccessFile for MemRandomAccessFile {
    fn read<'a>(&self, offset: u64, n: usize, scratch: &'a mut [u8]) -> EnvResult<&'a [u8]> {
        let data = self.data.read();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let len = n.min(scratch.len()).min(data.len() - start);
        scratch[..len].copy_from_slice(&data[start..start + len]);
        Ok(&scratch[..len])
    }
}

#[derive(Debug)]
struct MemWritableFile {
    filename: String,
    data: Option<FileData>,
}

impl WritableFile for MemWritableFile {
    fn append(&mut self, bytes: &[u8]) -> EnvResult<()> {
        match &self.data {
            Some(data) => {
                data.write().extend_from_slice(bytes);
                Ok(())
            }
            None => Err(EnvError::io(self.filename.as_str(), "file is closed")),
        }
    }

    fn flush(&mut self) -> EnvResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> EnvResult<()> {
        match self.data {
            Some(_) => Ok(()),
            None => Err(EnvError::io(self.filename.as_str(), "file is closed")),
        }
    }

    fn close(&mut self) -> EnvResult<()> {
        self.data = None;
        Ok(())
    }
}

#[derive(Debug)]
struct MemFileLock {
    filename: String,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl FileLock for MemFileLock {
    fn path(&self) -> &str {
        &self.filename
    }
}

impl Drop for MemFileLock {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.filename);
    }
}
