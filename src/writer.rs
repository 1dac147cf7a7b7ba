//! # Archive Writer
//!
//! Packs a directory tree into a ustar archive. The writer records every
//! entry's data offset while it goes, so the index of a freshly written
//! archive comes for free.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result, TarseekError};
use crate::fsx;
use crate::header::{self, Header, HeaderError, TypeFlag, BLOCK_LEN};
use crate::index::{ArchiveEntry, ArchiveIndex};
use crate::progress::{Observer, ProgressEvent};

/// File-name suffixes to leave out of an archive.
///
/// Parsed from a semicolon-delimited list such as `".log; .tmp;"`: items are
/// trimmed and empty items ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    suffixes: Vec<String>,
}

impl ExclusionList {
    pub fn parse(pattern: &str) -> Self {
        let suffixes =
            pattern.split(';').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        Self { suffixes }
    }

    /// True if `file_name` ends with any of the suffixes.
    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.suffixes.iter().any(|suffix| file_name.ends_with(suffix.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}

impl FromStr for ExclusionList {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Appends records to a tar stream and tracks where each one's data lands.
pub struct ArchiveWriter<W: Write> {
    inner: W,
    position: u64,
    index: ArchiveIndex,
}

impl<W: Write> ArchiveWriter<W> {
    /// Starts an archive on `inner`; `archive_path` labels errors and the index.
    pub fn new(inner: W, archive_path: impl Into<PathBuf>) -> Self {
        Self { inner, position: 0, index: ArchiveIndex::new(archive_path) }
    }

    /// Appends the file at `source` under the archive path `archive_name`.
    pub fn append_file(&mut self, archive_name: &str, source: &Path) -> Result<&ArchiveEntry> {
        let file = File::open(source).at(source)?;
        let meta = file.metadata().at(source)?;
        let (uid, gid) = fsx::owner(&meta);
        let header = Header {
            mode: fsx::maybe_unix_mode(&meta),
            uid,
            gid,
            mtime: Some(fsx::mtime_secs(&meta).unwrap_or(0)),
            ..Header::regular(archive_name, meta.len())
        };
        self.append_data(header, file, source)
    }

    /// Appends a record whose payload is read from `data`.
    ///
    /// Exactly `header.size` bytes must come out of `data`; a short source fails
    /// with `UnexpectedEof`, attributed to `origin`. Paths that do not fit a
    /// ustar header get a PAX `path` record in front of the header.
    pub fn append_data(
        &mut self,
        mut header: Header,
        data: impl Read,
        origin: &Path,
    ) -> Result<&ArchiveEntry> {
        let path = header.path.clone();
        if !header::fits_ustar(&path) {
            self.append_pax_path(&header, origin)?;
            header.path = header::truncated_name(&path).to_string();
        }
        let block = header.to_block().map_err(|e| invalid_header(e, origin))?;
        let archive = self.index.archive_path().to_path_buf();
        self.inner.write_all(&block).at(&archive)?;
        let data_offset = self.position + BLOCK_LEN as u64;

        let copied = io::copy(&mut data.take(header.size), &mut self.inner).at(origin)?;
        if copied != header.size {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes but the source ended after {}", header.size, copied),
            );
            return Err(TarseekError::io(err, origin));
        }
        let padded = header::padded_len(header.size);
        self.write_zeros((padded - header.size) as usize)?;
        self.position = data_offset + padded;

        let entry = ArchiveEntry::from_header(path.clone(), &header, data_offset, header.size);
        if self.index.insert(entry).is_some() {
            tracing::debug!(path = %path, "path already in the archive, later record shadows it");
        }
        self.index.info(&path)
    }

    /// Writes the end-of-archive marker and returns the stream and the index.
    pub fn finish(mut self) -> Result<(W, ArchiveIndex)> {
        self.write_zeros(BLOCK_LEN * 2)?;
        let archive = self.index.archive_path().to_path_buf();
        self.inner.flush().at(&archive)?;
        Ok((self.inner, self.index))
    }

    fn append_pax_path(&mut self, header: &Header, origin: &Path) -> Result<()> {
        let payload = header::pax_record("path", &header.path);
        let ext = Header {
            typeflag: TypeFlag::PAX_SINGLE,
            mode: Some(0o644),
            mtime: header.mtime,
            ..Header::regular("././@PaxHeader", payload.len() as u64)
        };
        let block = ext.to_block().map_err(|e| invalid_header(e, origin))?;
        let archive = self.index.archive_path().to_path_buf();
        self.inner.write_all(&block).at(&archive)?;
        self.inner.write_all(&payload).at(&archive)?;
        let padded = header::padded_len(ext.size);
        self.write_zeros((padded - ext.size) as usize)?;
        self.position += BLOCK_LEN as u64 + padded;
        Ok(())
    }

    fn write_zeros(&mut self, len: usize) -> Result<()> {
        const ZEROS: [u8; BLOCK_LEN] = [0; BLOCK_LEN];
        let mut left = len;
        while left > 0 {
            let n = left.min(BLOCK_LEN);
            self.inner.write_all(&ZEROS[..n]).at(self.index.archive_path())?;
            left -= n;
        }
        Ok(())
    }
}

/// Packs every regular file under `source_root` into a new archive at `archive_path`.
///
/// Files whose name matches `exclusions` are skipped. Entries are stored relative to
/// `source_root` with `/` separators, in file-name order. Parent directories of
/// `archive_path` are created as needed. Returns the index of the written archive.
pub fn pack(
    source_root: &Path,
    archive_path: &Path,
    exclusions: &ExclusionList,
    observer: &dyn Observer,
) -> Result<ArchiveIndex> {
    if !source_root.is_dir() {
        return Err(crate::config::invalid_input(source_root, "source is not a directory"));
    }
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).at(parent)?;
    }
    let out_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(archive_path)
        .at(archive_path)?;
    // The archive may live inside the tree it is packing
    let archive_canonical = archive_path.canonicalize().ok();

    let mut writer = ArchiveWriter::new(BufWriter::with_capacity(1 << 20, out_file), archive_path);
    for entry in WalkDir::new(source_root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(e, source_root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if exclusions.is_excluded(&file_name) {
            tracing::trace!(path = %entry.path().display(), "excluded");
            continue;
        }
        if archive_canonical.is_some() && entry.path().canonicalize().ok() == archive_canonical {
            continue;
        }

        let archive_name = relative_archive_name(source_root, entry.path())?;
        let written = writer.append_file(&archive_name, entry.path())?;
        observer.on_event(&ProgressEvent::EntryWritten { path: &written.path, size: written.size });
    }

    let (_, index) = writer.finish()?;
    tracing::info!(
        archive = %archive_path.display(),
        entries = index.len(),
        "archive written"
    );
    Ok(index)
}

/// `path` relative to `root`, joined with `/`
fn relative_archive_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| crate::config::invalid_input(path, "path is outside the source root"))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => {
                    let err =
                        io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8");
                    return Err(TarseekError::io(err, path));
                }
            },
            _ => return Err(crate::config::invalid_input(path, "unexpected path component")),
        }
    }
    Ok(parts.join("/"))
}

fn invalid_header(err: HeaderError, origin: &Path) -> TarseekError {
    TarseekError::io(io::Error::new(io::ErrorKind::InvalidInput, err), origin)
}

fn walk_error(err: walkdir::Error, root: &Path) -> TarseekError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));
    TarseekError::io(source, path)
}
