//! # Offset Index
//!
//! An [`ArchiveIndex`] maps every regular file of one tar archive to the byte
//! offset and length of its data. It is built with a single header-only pass
//! over the archive ([`build_index`]) or handed back by the writer, and it is
//! persisted as a side-car JSON document:
//!
//! ```json
//! {
//!   "a.txt": { "offset": 512, "size": 12, "mode": 420, "mtime": 1700000000 },
//!   "dir/c.txt": { "offset": 1536, "size": 3 }
//! }
//! ```
//!
//! The index is a snapshot. Nothing detects that the archive was rewritten
//! afterwards; regenerate the index whenever the archive changes.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result, TarseekError};
use crate::header::{Header, TypeFlag};
use crate::progress::{Observer, ProgressEvent};
use crate::reader::TarReader;

/// Location and metadata of one file inside an archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative POSIX path; the key of the index map on disk.
    #[serde(skip)]
    pub path: String,
    /// Byte offset of the entry's data within the archive file.
    pub offset: u64,
    /// Length of the entry's data in bytes.
    pub size: u64,
    /// Unix permission bits, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// Modification time in seconds since the Unix epoch, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
}

impl ArchiveEntry {
    pub(crate) fn from_header(path: String, header: &Header, offset: u64, size: u64) -> Self {
        Self { path, offset, size, mode: header.mode, mtime: header.mtime }
    }
}

/// The table of entries of one archive snapshot.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    archive_path: PathBuf,
    entries: BTreeMap<String, ArchiveEntry>,
    created_at: DateTime<Utc>,
}

impl ArchiveIndex {
    /// An empty index for `archive_path`, stamped with the current time.
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self { archive_path: archive_path.into(), entries: BTreeMap::new(), created_at: Utc::now() }
    }

    /// Adds `entry`, returning the entry it shadows if the path was already present.
    ///
    /// The key is the path exactly as stored in the archive.
    pub fn insert(&mut self, entry: ArchiveEntry) -> Option<ArchiveEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True iff `path` is a key of the index.
    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Size in bytes of the entry at `path`.
    pub fn size(&self, path: &str) -> Result<u64> {
        self.info(path).map(|entry| entry.size)
    }

    /// The full entry at `path`.
    pub fn info(&self, path: &str) -> Result<&ArchiveEntry> {
        self.entries.get(path).ok_or_else(|| TarseekError::not_found(path))
    }

    /// All entry paths, sorted.
    pub fn list_paths(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// All entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }

    /// Writes the index as pretty-printed JSON, creating parent directories.
    pub fn save(&self, index_path: &Path) -> Result<()> {
        if let Some(parent) = index_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).at(parent)?;
        }
        let mut writer = BufWriter::new(File::create(index_path).at(index_path)?);
        serde_json::to_writer_pretty(&mut writer, &self.entries)
            .map_err(|source| TarseekError::Index { source, path: index_path.to_path_buf() })?;
        writer.write_all(b"\n").at(index_path)?;
        writer.flush().at(index_path)?;
        Ok(())
    }

    /// Reads an index previously written by [`ArchiveIndex::save`].
    ///
    /// The creation time is taken from the index file's modification time.
    pub fn load(archive_path: impl Into<PathBuf>, index_path: &Path) -> Result<Self> {
        let file = File::open(index_path).at(index_path)?;
        let created_at = file
            .metadata()
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let raw: BTreeMap<String, ArchiveEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| TarseekError::Index { source, path: index_path.to_path_buf() })?;

        let archive_path = archive_path.into();
        let mut index = Self { archive_path, entries: BTreeMap::new(), created_at };
        for (path, mut entry) in raw {
            entry.path = path;
            index.insert(entry);
        }
        Ok(index)
    }
}

/// Builds the index of `archive_path` from its headers alone.
///
/// Only regular files are indexed. When a path occurs more than once the last
/// record wins, the same way tar readers shadow earlier members.
pub fn build_index(archive_path: &Path, observer: &dyn Observer) -> Result<ArchiveIndex> {
    let file = File::open(archive_path).at(archive_path)?;
    let mut reader = TarReader::new(BufReader::new(file), archive_path)?;
    let mut index = ArchiveIndex::new(archive_path);

    while let Some(entry) = reader.next_entry()? {
        if !TypeFlag::is_regular(entry.header.typeflag) {
            continue;
        }
        let record =
            ArchiveEntry::from_header(entry.path, &entry.header, entry.data_offset, entry.size);
        if let Some(shadowed) = index.insert(record) {
            let (path, offset) = (&shadowed.path, shadowed.offset);
            tracing::debug!(path = %path, offset, "duplicate path, keeping the later record");
        }
    }

    observer.on_event(&ProgressEvent::IndexBuilt { entries: index.len() });
    Ok(index)
}
