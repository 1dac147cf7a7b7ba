//! Paths and tunables for archive operations.
//!
//! An [`ArchiveConfig`] carries the archive path and its index path side by
//! side, so no operation ever has to guess one from the other by string
//! surgery on file extensions.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result, TarseekError};

/// Default export chunk size: 1 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;
/// Default number of attempts per export chunk
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Environment variable consulted by the CLI for the default chunk size
pub const CHUNK_SIZE_ENV: &str = "TARSEEK_CHUNK_SIZE";

/// Where an archive and its side-car index live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub archive_path: PathBuf,
    pub index_path: PathBuf,
}

impl ArchiveConfig {
    /// Both paths given explicitly.
    pub fn new(archive_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self { archive_path: archive_path.into(), index_path: index_path.into() }
    }

    /// The index sits next to the archive, with the extension replaced by `.json`
    /// (or `.json` appended when the archive has no extension).
    pub fn for_archive(archive_path: impl Into<PathBuf>) -> Self {
        let archive_path = archive_path.into();
        let index_path = default_index_path(&archive_path);
        Self { archive_path, index_path }
    }

    /// `<cwd>/<dirname>.tar` plus its default index.
    pub fn for_directory(source_dir: &Path) -> Result<Self> {
        let cwd = env::current_dir().at(".")?;
        Ok(Self::for_archive(cwd.join(format!("{}.tar", directory_name(source_dir)?))))
    }

    /// Replaces the index path, keeping the archive path.
    pub fn with_index_path(mut self, index_path: impl Into<PathBuf>) -> Self {
        self.index_path = index_path.into();
        self
    }
}

/// The archive path with its extension swapped for `.json`.
pub fn default_index_path(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("json")
}

/// Final path component of `dir`, resolving `.` and `..` through the filesystem.
pub(crate) fn directory_name(dir: &Path) -> Result<String> {
    let name = match dir.file_name() {
        Some(name) => name.to_owned(),
        None => dir
            .canonicalize()
            .at(dir)?
            .file_name()
            .map(|n| n.to_owned())
            .ok_or_else(|| invalid_input(dir, "directory has no name"))?,
    };
    Ok(name.to_string_lossy().into_owned())
}

/// Tunables for [`crate::export::export`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Size of each streamed chunk in bytes
    pub chunk_size: usize,
    /// Transfer even if the destination already has the expected size
    pub force_overwrite: bool,
    /// Attempts per chunk before giving up with a transfer error
    pub max_attempts: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            force_overwrite: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ExportOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub(crate) fn validate(&self, destination: &Path) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid_input(destination, "chunk size must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(invalid_input(destination, "at least one transfer attempt is required"));
        }
        Ok(())
    }
}

pub(crate) fn invalid_input(path: &Path, msg: &str) -> TarseekError {
    TarseekError::io(io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()), path)
}
