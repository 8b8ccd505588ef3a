//! # Stratum Env
//!
//! Operating-system environment layer for the Stratum storage engine.
//!
//! This crate is the only place the engine touches the host: files,
//! directories, advisory locks, background work, info logs and time all
//! go through the [`Env`] trait, so the engine never needs to know which
//! platform it runs on.
//!
//! ## Design Principles
//!
//! - Every operation returns an [`EnvResult`] classified as `NotFound` or `IoError`
//! - Handles own exactly one host handle and release it on drop
//! - Random-access reads are positional and safe to share across threads
//! - Logging is best effort and never fails the caller
//! - No retries, except a single delete-and-retry on rename conflicts
//!
//! ## Available Environments
//!
//! - [`HostEnv`] - The host operating system; [`default_env`] returns the shared instance
//! - [`InMemoryEnv`] - An in-memory file system for tests
//!
//! ## Example
//!
//! ```rust
//! use stratum_env::{Env, EnvExt, InMemoryEnv};
//!
//! let env = InMemoryEnv::new();
//! env.create_dir("/db").unwrap();
//! env.write_string_to_file(b"MANIFEST-000001\n", "/db/CURRENT", true).unwrap();
//!
//! let file = env.new_random_access_file("/db/CURRENT").unwrap();
//! let mut scratch = [0u8; 8];
//! assert_eq!(file.read(0, 8, &mut scratch).unwrap(), b"MANIFEST");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod env;
mod error;
mod file;
mod host;
mod lock;
mod logger;
mod memory;
mod path;
mod scheduler;

pub use config::EnvConfig;
pub use dir::is_rename_conflict;
pub use env::{default_env, Env, EnvExt, HostEnv};
pub use error::{classify, EnvError, EnvResult, ErrorKind};
pub use file::{FileLock, RandomAccessFile, SequentialFile, WritableFile};
pub use host::{HostRandomAccessFile, HostSequentialFile, HostWritableFile};
pub use lock::{HostFileLock, LOCK_HELD_MESSAGE};
pub use logger::{current_thread_id, FileLogger, Logger};
pub use memory::InMemoryEnv;
pub use path::{process_base_dir, PathResolver, ALT_SEPARATOR};
pub use scheduler::{spawn_detached, task, Job, ThreadPool};
