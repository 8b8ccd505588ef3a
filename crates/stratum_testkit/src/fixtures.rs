//! Test fixtures and environment helpers.
//!
//! Provides scratch directories bound to an environment, and a one-line
//! tracing setup for tests that want to see the environment's diagnostics.

use std::sync::Once;
use stratum_env::{Env, EnvConfig, HostEnv, InMemoryEnv};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A host environment rooted in a temporary directory with automatic cleanup.
pub struct TestEnv {
    /// The environment instance.
    pub env: HostEnv,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestEnv {
    /// Creates a host environment with a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(EnvConfig::default())
    }

    /// Creates a host environment with the given configuration.
    pub fn with_config(config: EnvConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            env: HostEnv::with_config(config),
            temp_dir,
        }
    }

    /// Returns the scratch directory as an environment path.
    pub fn root(&self) -> String {
        self.temp_dir.path().to_string_lossy().into_owned()
    }

    /// Returns the environment path of `name` inside the scratch directory.
    pub fn path(&self, name: &str) -> String {
        join(&self.root(), name)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEnv {
    type Target = HostEnv;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

/// Joins an environment path and a child name with `/`.
pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Runs a test with a host environment and a temporary root directory.
///
/// # Example
///
/// ```rust,ignore
/// use stratum_testkit::with_host_env;
///
/// #[test]
/// fn my_test() {
///     with_host_env(|env, root| {
///         env.create_dir(&format!("{root}/db")).unwrap();
///     });
/// }
/// ```
pub fn with_host_env<F, R>(f: F) -> R
where
    F: FnOnce(&dyn Env, &str) -> R,
{
    let test_env = TestEnv::new();
    let root = test_env.root();
    f(&test_env.env, &root)
}

/// Runs a test with an in-memory environment rooted at `/test`.
pub fn with_memory_env<F, R>(f: F) -> R
where
    F: FnOnce(&dyn Env, &str) -> R,
{
    let env = InMemoryEnv::new();
    env.create_dir("/test").expect("Failed to create memory root");
    f(&env, "/test")
}

/// Runs a test once against each environment implementation.
pub fn with_each_env<F>(mut f: F)
where
    F: FnMut(&dyn Env, &str),
{
    with_host_env(&mut f);
    with_memory_env(&mut f);
}

/// Installs a tracing subscriber for tests, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_paths() {
        let env = TestEnv::new();
        assert!(env.file_exists(&env.root()));
        assert_eq!(env.path("LOCK"), format!("{}/LOCK", env.root()));
    }

    #[test]
    fn join_trims_trailing_separator() {
        assert_eq!(join("/db/", "LOG"), "/db/LOG");
        assert_eq!(join("/db", "LOG"), "/db/LOG");
    }

    #[test]
    fn each_env_runs_twice() {
        init_test_tracing();
        let mut roots = Vec::new();
        with_each_env(|env, root| {
            assert!(env.file_exists(root));
            roots.push(root.to_string());
        });
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[1], "/test");
    }
}
