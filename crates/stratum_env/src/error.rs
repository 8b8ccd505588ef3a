//! Error types and host error classification.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for environment operations.
pub type EnvResult<T> = Result<T, EnvError>;

/// Errors returned by environment operations.
///
/// Every variant carries a context string naming the path or operation
/// that failed, plus the host error that caused it.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The named entry does not exist on the host.
    #[error("NotFound: {context}: {source}")]
    NotFound {
        /// The path or operation that failed.
        context: String,
        /// The host error.
        #[source]
        source: io::Error,
    },

    /// Any other host-reported failure.
    #[error("IO error: {context}: {source}")]
    Io {
        /// The path or operation that failed.
        context: String,
        /// The host error.
        #[source]
        source: io::Error,
    },
}

/// The coarse classification of an [`EnvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entry absent at the host level.
    NotFound,
    /// Every other host failure.
    IoError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("NotFound"),
            Self::IoError => f.write_str("IO error"),
        }
    }
}

impl EnvError {
    /// Creates an I/O error that did not originate from a host call.
    pub fn io(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
            source: io::Error::new(io::ErrorKind::Other, message.into()),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::IoError,
        }
    }

    /// Returns true if this error reports a missing entry.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns the context string (path or operation) of this error.
    #[must_use]
    pub fn context(&self) -> &str {
        match self {
            Self::NotFound { context, .. } | Self::Io { context, .. } => context,
        }
    }

    /// Returns the underlying host error.
    #[must_use]
    pub fn host_error(&self) -> &io::Error {
        match self {
            Self::NotFound { source, .. } | Self::Io { source, .. } => source,
        }
    }
}

/// Maps a host error to an [`EnvError`].
///
/// `io::Error` captures the OS error code at the failing call, so the
/// classification cannot be disturbed by later system calls.
pub fn classify(context: impl Into<String>, err: io::Error) -> EnvError {
    let context = context.into();
    if err.kind() == io::ErrorKind::NotFound {
        EnvError::NotFound {
            context,
            source: err,
        }
    } else {
        EnvError::Io {
            context,
            source: err,
        }
    }
}

/// Like [`classify`], but always reports [`ErrorKind::IoError`].
pub(crate) fn io_error(context: impl Into<String>, err: io::Error) -> EnvError {
    EnvError::Io {
        context: context.into(),
        source: err,
    }
}
