//! Environment configuration.

use std::path::PathBuf;

/// Configuration for constructing an environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Directory that rooted paths are anchored to.
    ///
    /// `None` uses the process base directory (the directory containing
    /// the running executable).
    pub base_dir: Option<PathBuf>,

    /// Whether paths starting with a separator are anchored at `base_dir`.
    ///
    /// Defaults to `true` on Windows, where a leading separator means the
    /// root of the current drive, and `false` elsewhere. With anchoring off,
    /// a rooted path such as `/var/db/LOCK` is used as given rather than
    /// being placed under the base directory.
    pub anchor_rooted_paths: bool,

    /// Number of worker threads serving `schedule` (0 = available parallelism).
    pub background_threads: usize,

    /// Size of the first-pass log formatting buffer.
    pub log_buffer_size: usize,

    /// Size of the second-pass log formatting buffer. Longer records are truncated.
    pub log_max_buffer_size: usize,

    /// Directory name under the host temp directory used for test scratch space.
    pub test_dir_name: String,

    /// Prefix for names of threads spawned by the environment.
    pub thread_name_prefix: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            anchor_rooted_paths: cfg!(windows),
            background_threads: 0,
            log_buffer_size: 500,
            log_max_buffer_size: 30_000,
            test_dir_name: "stratum".to_string(),
            thread_name_prefix: "stratum".to_string(),
        }
    }
}

impl EnvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory rooted paths are anchored to.
    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Sets whether rooted paths are anchored at the base directory.
    #[must_use]
    pub const fn anchor_rooted_paths(mut self, value: bool) -> Self {
        self.anchor_rooted_paths = value;
        self
    }

    /// Sets the number of background worker threads.
    #[must_use]
    pub const fn background_threads(mut self, count: usize) -> Self {
        self.background_threads = count;
        self
    }

    /// Sets the first- and second-pass log buffer sizes.
    #[must_use]
    pub const fn log_buffer_sizes(mut self, small: usize, large: usize) -> Self {
        self.log_buffer_size = small;
        self.log_max_buffer_size = large;
        self
    }

    /// Sets the test scratch directory name.
    #[must_use]
    pub fn test_dir_name(mut self, name: impl Into<String>) -> Self {
        self.test_dir_name = name.into();
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Returns the effective worker count for the scheduler pool.
    pub(crate) fn worker_count(&self) -> usize {
        if self.background_threads > 0 {
            return self.background_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
