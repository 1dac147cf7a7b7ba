use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `tarseek` crate.
#[derive(Error, Debug)]
pub enum TarseekError {
    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },

    /// An archive entry would be written outside the extraction root.
    #[error("Refusing to extract unsafe entry path '{path}'")]
    UnsafePath { path: String },

    /// The tar stream is corrupt, truncated or uses an unsupported encoding.
    #[error("Invalid archive '{}': {reason}", archive.display())]
    Format { archive: PathBuf, reason: String },

    /// The index document could not be parsed or serialized.
    #[error("Invalid index '{}': {source}", path.display())]
    Index { source: serde_json::Error, path: PathBuf },

    /// A path was looked up that the index does not contain.
    #[error("'{path}' is not present in the archive index")]
    NotFound { path: String },

    /// A chunked export gave up after exhausting its retries.
    #[error("Transfer of '{entry}' failed at byte {position} after {attempts} attempts: {source}")]
    Transfer {
        entry: String,
        position: u64,
        attempts: u32,
        source: io::Error,
    },
}

/// Coarse classification of a [`TarseekError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem access, directory creation or path-traversal rejection.
    Io,
    /// Corrupt or unparsable archive or index.
    Format,
    /// Query for a path absent from the index.
    NotFound,
    /// A chunked export exhausted its retries.
    Transfer,
}

impl TarseekError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        TarseekError::Io { source, path: path.into() }
    }

    pub fn format(archive: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TarseekError::Format { archive: archive.into(), reason: reason.into() }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        TarseekError::NotFound { path: path.into() }
    }

    /// Returns which branch of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TarseekError::Io { .. } | TarseekError::UnsafePath { .. } => ErrorKind::Io,
            TarseekError::Format { .. } | TarseekError::Index { .. } => ErrorKind::Format,
            TarseekError::NotFound { .. } => ErrorKind::NotFound,
            TarseekError::Transfer { .. } => ErrorKind::Transfer,
        }
    }
}

/// Extension to attach a path to `io::Result` values.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| TarseekError::io(e, path))
    }
}

pub type Result<T> = std::result::Result<T, TarseekError>;
