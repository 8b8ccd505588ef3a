//! Path resolution.
//!
//! Caller paths are plain strings. Resolution rewrites the alternate
//! separator (`/`) to the native one and, when anchoring is enabled,
//! prefixes rooted paths with the process base directory.

use once_cell::sync::Lazy;
use std::path::{PathBuf, MAIN_SEPARATOR};

/// The separator every host accepts in caller paths.
pub const ALT_SEPARATOR: char = '/';

static PROCESS_BASE_DIR: Lazy<String> = Lazy::new(|| {
    let dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = dir.to_string_lossy().into_owned();
    tracing::debug!(base_dir = %dir, "captured process base directory");
    dir
});

/// Returns the process base directory.
///
/// Captured once, on first use, as the directory containing the running
/// executable. Never changes afterwards.
pub fn process_base_dir() -> &'static str {
    &PROCESS_BASE_DIR
}

/// Canonicalizes caller-supplied paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: String,
    separator: char,
    anchor_rooted: bool,
}

impl PathResolver {
    /// Creates a resolver for the host separator.
    pub fn new(base_dir: impl Into<String>, anchor_rooted: bool) -> Self {
        Self::with_separator(base_dir, MAIN_SEPARATOR, anchor_rooted)
    }

    /// Creates a resolver that emits `separator` as the native separator.
    pub fn with_separator(base_dir: impl Into<String>, separator: char, anchor_rooted: bool) -> Self {
        let mut base_dir = normalize(&base_dir.into(), separator);
        while base_dir.len() > 1 && base_dir.ends_with(separator) {
            base_dir.pop();
        }
        Self {
            base_dir,
            separator,
            anchor_rooted,
        }
    }

    /// Returns the (normalized) base directory.
    #[must_use]
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Resolves `path` to its string form.
    ///
    /// Resolving an already-resolved path is a no-op.
    #[must_use]
    pub fn resolve_str(&self, path: &str) -> String {
        let normalized = normalize(path, self.separator);
        if self.anchor_rooted
            && normalized.starts_with(self.separator)
            && !self.is_anchored(&normalized)
        {
            let mut anchored = String::with_capacity(self.base_dir.len() + normalized.len());
            anchored.push_str(&self.base_dir);
            anchored.push_str(&normalized);
            return anchored;
        }
        normalized
    }

    /// Resolves `path` to a host path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        PathBuf::from(self.resolve_str(path))
    }

    fn is_anchored(&self, path: &str) -> bool {
        match path.strip_prefix(self.base_dir.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(self.separator),
            None => false,
        }
    }
}

fn normalize(path: &str, separator: char) -> String {
    if separator == ALT_SEPARATOR {
        return path.to_string();
    }
    path.replace(ALT_SEPARATOR, &separator.to_string())
}
