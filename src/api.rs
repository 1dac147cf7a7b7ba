//! High-level entry points driven by an [`ArchiveConfig`].
//!
//! These are the operations the CLI exposes: each one resolves the archive and
//! index paths from the config and hands off to the module that does the work.

use std::path::{Path, PathBuf};

use crate::config::{ArchiveConfig, ExportOptions};
use crate::error::Result;
use crate::export::{self, ExportOutcome};
use crate::index::{self, ArchiveEntry, ArchiveIndex};
use crate::progress::Observer;
use crate::source::LocalSource;
use crate::unpack;
use crate::writer::{self, ExclusionList};

/// Packs `source_dir` into `config.archive_path` and returns that path.
pub fn pack_directory(
    source_dir: &Path,
    config: &ArchiveConfig,
    exclusions: &ExclusionList,
    observer: &dyn Observer,
) -> Result<PathBuf> {
    writer::pack(source_dir, &config.archive_path, exclusions, observer)?;
    Ok(config.archive_path.clone())
}

/// Packs `source_dir` and writes the index of the new archive; returns the index path.
pub fn pack_directory_with_index(
    source_dir: &Path,
    config: &ArchiveConfig,
    exclusions: &ExclusionList,
    observer: &dyn Observer,
) -> Result<PathBuf> {
    let index = writer::pack(source_dir, &config.archive_path, exclusions, observer)?;
    index.save(&config.index_path)?;
    tracing::info!(index = %config.index_path.display(), entries = index.len(), "index written");
    Ok(config.index_path.clone())
}

/// Extracts `archive_path` below `destination_dir` (current directory if `None`).
pub fn unpack_archive(
    archive_path: &Path,
    destination_dir: Option<&Path>,
    observer: &dyn Observer,
) -> Result<PathBuf> {
    let destination = destination_dir.unwrap_or_else(|| Path::new("."));
    unpack::unpack(archive_path, destination, observer)
}

/// Indexes `config.archive_path` from its headers and saves the result; returns the index path.
pub fn create_index(config: &ArchiveConfig, observer: &dyn Observer) -> Result<PathBuf> {
    let index = index::build_index(&config.archive_path, observer)?;
    index.save(&config.index_path)?;
    tracing::info!(index = %config.index_path.display(), entries = index.len(), "index written");
    Ok(config.index_path.clone())
}

/// Loads the saved index for `config`.
pub fn load_index(config: &ArchiveConfig) -> Result<ArchiveIndex> {
    ArchiveIndex::load(&config.archive_path, &config.index_path)
}

pub fn list_files(config: &ArchiveConfig) -> Result<Vec<String>> {
    Ok(load_index(config)?.list_paths().into_iter().map(String::from).collect())
}

pub fn file_exists(config: &ArchiveConfig, file_in_archive: &str) -> Result<bool> {
    Ok(load_index(config)?.exists(file_in_archive))
}

pub fn file_size(config: &ArchiveConfig, file_in_archive: &str) -> Result<u64> {
    load_index(config)?.size(file_in_archive)
}

pub fn file_info(config: &ArchiveConfig, file_in_archive: &str) -> Result<ArchiveEntry> {
    load_index(config)?.info(file_in_archive).cloned()
}

/// Exports one file from a local archive using its saved index.
pub fn export_file(
    config: &ArchiveConfig,
    file_in_archive: &str,
    local_file: &Path,
    options: &ExportOptions,
    observer: &dyn Observer,
) -> Result<ExportOutcome> {
    let index = load_index(config)?;
    let source = LocalSource::new(&config.archive_path);
    export::export(&source, &index, file_in_archive, local_file, options, observer)
}
