//! Directory and file-system metadata operations.
//!
//! All functions take paths that have already been resolved.

use crate::error::{classify, io_error, EnvResult};
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Returns true if `path` names an existing entry.
///
/// Entries whose existence cannot be determined are reported as absent.
#[must_use]
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Creates `path` and any missing parents.
///
/// An existing directory is not an error.
///
/// # Errors
///
/// Returns a classified error if the host rejects a creation for any
/// reason other than the directory already existing.
pub fn create_dir_all(path: &Path) -> EnvResult<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    match fs::create_dir(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "created directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(classify(
            format!("{}: could not create directory", path.display()),
            e,
        )),
    }
}

/// Removes the empty directory `path`.
///
/// # Errors
///
/// Returns a classified error if the directory is missing, not empty,
/// or cannot be removed.
pub fn remove_dir(path: &Path) -> EnvResult<()> {
    fs::remove_dir(path)
        .map_err(|e| classify(format!("{}: could not delete directory", path.display()), e))
}

/// Removes the file `path`.
///
/// # Errors
///
/// Returns `NotFound` if the file is missing, `IoError` otherwise.
pub fn remove_file(path: &Path) -> EnvResult<()> {
    fs::remove_file(path).map_err(|e| classify(path.display().to_string(), e))
}

/// Lists the names of the direct children of `path`, in host order.
///
/// # Errors
///
/// Returns an `IoError` if the directory cannot be enumerated.
pub fn children(path: &Path) -> EnvResult<Vec<String>> {
    let context = || format!("{}: could not get children", path.display());
    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| io_error(context(), e))? {
        let entry = entry.map_err(|e| io_error(context(), e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Returns the size of the file at `path`.
///
/// The file is opened for the query, which also requires read access.
///
/// # Errors
///
/// Returns a classified error if the file cannot be opened or its size
/// cannot be read.
pub fn file_size(path: &Path) -> EnvResult<u64> {
    let context = || format!("{}: could not get the file size", path.display());
    let file = File::open(path).map_err(|e| classify(context(), e))?;
    let metadata = file.metadata().map_err(|e| classify(context(), e))?;
    Ok(metadata.len())
}

/// Returns true if `err` reports that a rename failed because the
/// destination exists and cannot be replaced.
#[must_use]
pub fn is_rename_conflict(err: &io::Error, target_exists: bool) -> bool {
    #[cfg(windows)]
    {
        const ERROR_ACCESS_DENIED: i32 = 5;
        const ERROR_ALREADY_EXISTS: i32 = 183;
        match err.raw_os_error() {
            Some(ERROR_ALREADY_EXISTS) => true,
            Some(ERROR_ACCESS_DENIED) => target_exists,
            _ => false,
        }
    }
    #[cfg(not(windows))]
    {
        err.kind() == io::ErrorKind::AlreadyExists && target_exists
    }
}

/// Renames `src` to `target`, replacing `target` if it exists.
///
/// If the host refuses because `target` is in the way, `target` is
/// deleted and the rename retried once.
///
/// # Errors
///
/// Returns a classified error if the rename fails, or if the fallback
/// delete or retried rename fails.
pub fn rename(src: &Path, target: &Path) -> EnvResult<()> {
    rename_with(
        src,
        target,
        |from, to| fs::rename(from, to),
        |path| fs::remove_file(path),
    )
}

/// Rename with injectable host operations.
pub(crate) fn rename_with<M, D>(
    src: &Path,
    target: &Path,
    mut move_file: M,
    mut delete_file: D,
) -> EnvResult<()>
where
    M: FnMut(&Path, &Path) -> io::Result<()>,
    D: FnMut(&Path) -> io::Result<()>,
{
    let context = || {
        format!(
            "{} -> {}: could not rename file",
            src.display(),
            target.display()
        )
    };
    match move_file(src, target) {
        Ok(()) => {
            tracing::debug!(src = %src.display(), target = %target.display(), "renamed file");
            Ok(())
        }
        Err(e) if is_rename_conflict(&e, target.exists()) => {
            tracing::warn!(
                src = %src.display(),
                target = %target.display(),
                error = %e,
                "rename target in the way, deleting and retrying"
            );
            delete_file(target).map_err(|e| classify(context(), e))?;
            move_file(src, target).map_err(|e| classify(context(), e))
        }
        Err(e) => Err(classify(context(), e)),
    }
}
