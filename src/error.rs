//! Error types for b64pack

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for b64pack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the archive and codec pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Reading a source or input file failed
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a scratch or destination file failed
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ZIP writer or reader rejected an operation
    #[error("archive error for {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Malformed Base64 in the body of the input
    #[error("invalid base64 near base64 character {offset}: {source}")]
    Decode {
        /// Index among the Base64 alphabet characters read so far; line
        /// breaks and other skipped bytes are not counted
        offset: u64,
        #[source]
        source: base64::DecodeError,
    },

    /// Decoded bytes are not a well-formed ZIP archive
    #[error("{} is not a valid ZIP archive: {reason}", .path.display())]
    NotAnArchive { path: PathBuf, reason: String },

    /// Cancellation was observed at a chunk boundary
    #[error("operation canceled")]
    Canceled,

    /// Invalid pipeline configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The background worker could not be started or panicked
    #[error("worker error: {0}")]
    Worker(String),

    /// I/O error without a more specific path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a failure, stable enough for a front-end to branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Archive,
    Decode,
    NotAnArchive,
    Config,
    Internal,
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Error::Zip {
            path: path.into(),
            source,
        }
    }

    /// Classify this error. `Canceled` is reported as `Internal` because the
    /// task runner never turns it into a failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Read { .. } | Error::Write { .. } | Error::Io(_) => FailureKind::Io,
            Error::Zip { .. } => FailureKind::Archive,
            Error::Decode { .. } => FailureKind::Decode,
            Error::NotAnArchive { .. } => FailureKind::NotAnArchive,
            Error::Config(_) => FailureKind::Config,
            Error::Canceled | Error::Worker(_) => FailureKind::Internal,
        }
    }

    /// Path of the file the error is about, when there is one
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Read { path, .. }
            | Error::Write { path, .. }
            | Error::Zip { path, .. }
            | Error::NotAnArchive { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}
