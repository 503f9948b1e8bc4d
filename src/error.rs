//! Error types for blockcopy.
//!
//! The taxonomy is intentionally small: every failure mode that the
//! coordinator, worker pool, server, and client need to distinguish gets
//! exactly one variant. A missing local file is not an error (see
//! [`crate::fileio::size`]) — only a failure to determine whether it's
//! missing is.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for blockcopy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed CLI arguments, a both-local or both-remote source/target
    /// pair, or a rejected URL scheme.
    #[error("usage error: {0}")]
    Usage(String),

    /// A local file operation failed for a reason other than "does not
    /// exist" (permission denied, disk full, and so on).
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote side returned a non-2xx status (other than `/info`'s
    /// 404, which is not an error) or the connection itself failed.
    #[error("remote error: {0}")]
    Remote(String),

    /// A worker inside a [`crate::pool::WorkerPool`] returned an error;
    /// captured on the output channel and re-raised to the caller that
    /// drains the pool.
    #[error("worker error: {0}")]
    Worker(String),

    /// An operator declined to proceed with an action that requires
    /// explicit confirmation. Reserved for parity with the source
    /// taxonomy; nothing in this crate currently raises it.
    #[error("aborted by operator")]
    OperatorAbort,

    /// The requested hash algorithm is not in the registry.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
}

impl Error {
    /// Build an [`Error::Io`] with path context attached.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`Error::Usage`] error from any displayable message.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Build a [`Error::Remote`] error from any displayable message.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Build a [`Error::Worker`] error from any displayable message.
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }

    /// True if retrying the operation that produced this error might
    /// succeed (transient I/O, remote connectivity).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Remote(_))
    }

    /// The path associated with this error, if it carries one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for attaching a path to a bare [`std::io::Result`].
pub trait IoResultExt<T> {
    /// Attach `path` to the error variant if this result is an error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
