//! # Random-Access Export
//!
//! Copies a single entry out of an archive using its index record: one range
//! request for the entry's data, streamed to the destination in fixed-size
//! chunks. Nothing before or after the entry is read.
//!
//! A chunk that fails part-way is resumed from the last byte actually
//! received, on a freshly opened range, up to `max_attempts` times.

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::config::ExportOptions;
use crate::error::{IoResultExt, Result, TarseekError};
use crate::index::{ArchiveEntry, ArchiveIndex};
use crate::progress::{Observer, ProgressEvent};
use crate::source::ArchiveSource;

/// What an export did. Both variants are a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The entry was streamed to the destination
    Transferred { bytes: u64 },
    /// The destination already had the expected size
    Skipped,
}

impl ExportOutcome {
    pub fn was_transferred(&self) -> bool {
        matches!(self, ExportOutcome::Transferred { .. })
    }
}

type RangeReader = Box<dyn Read + Send>;

/// Exports `entry_path` from `source` to `destination`.
///
/// If the transfer fails with [`TarseekError::Transfer`] the destination holds
/// an unspecified prefix of the entry and must be discarded by the caller.
pub fn export(
    source: &dyn ArchiveSource,
    index: &ArchiveIndex,
    entry_path: &str,
    destination: &Path,
    options: &ExportOptions,
    observer: &dyn Observer,
) -> Result<ExportOutcome> {
    options.validate(destination)?;
    let entry = index.info(entry_path)?;

    if !options.force_overwrite && has_expected_size(destination, entry.size) {
        observer.on_event(&ProgressEvent::ExportSkipped { entry: &entry.path });
        return Ok(ExportOutcome::Skipped);
    }
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).at(parent)?;
    }

    tracing::debug!(
        entry = %entry.path,
        source = %source.describe(),
        offset = entry.offset,
        size = entry.size,
        "exporting entry"
    );
    let mut out = BufWriter::new(File::create(destination).at(destination)?);
    let mut buf = vec![0u8; entry.size.min(options.chunk_size as u64).max(1) as usize];
    let mut stream: Option<RangeReader> = None;
    let mut done = 0u64;

    while done < entry.size {
        let want = (entry.size - done).min(buf.len() as u64) as usize;
        let chunk = &mut buf[..want];
        fill_chunk(source, entry, done, chunk, &mut stream, options.max_attempts, observer)?;
        out.write_all(chunk).at(destination)?;
        done += want as u64;
        let total = entry.size;
        observer.on_event(&ProgressEvent::ChunkTransferred { entry: &entry.path, done, total });
    }
    out.flush().at(destination)?;

    Ok(ExportOutcome::Transferred { bytes: entry.size })
}

fn has_expected_size(destination: &Path, size: u64) -> bool {
    fs::metadata(destination).map(|meta| meta.is_file() && meta.len() == size).unwrap_or(false)
}

/// Fills `chunk` with entry bytes starting `start` bytes into the entry.
fn fill_chunk(
    source: &dyn ArchiveSource,
    entry: &ArchiveEntry,
    start: u64,
    chunk: &mut [u8],
    stream: &mut Option<RangeReader>,
    max_attempts: u32,
    observer: &dyn Observer,
) -> Result<()> {
    let mut filled = 0usize;
    let mut attempt = 1u32;
    loop {
        let position = start + filled as u64;
        let result = match stream {
            Some(reader) => read_into(reader.as_mut(), chunk, &mut filled),
            None => match source.open_range(entry.offset + position, entry.size - position) {
                Ok(reader) => read_into(stream.insert(reader).as_mut(), chunk, &mut filled),
                Err(e) => Err(e),
            },
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                // The handle's position is unknown after a failure
                *stream = None;
                let position = start + filled as u64;
                if attempt >= max_attempts {
                    return Err(TarseekError::Transfer {
                        entry: entry.path.clone(),
                        position,
                        attempts: attempt,
                        source: e,
                    });
                }
                let event = ProgressEvent::ChunkRetried { entry: &entry.path, position, attempt };
                observer.on_event(&event);
                attempt += 1;
            }
        }
    }
}

/// Reads until `chunk` is full, counting progress in `filled` so that a failed
/// read loses nothing that was already received.
fn read_into(reader: &mut dyn Read, chunk: &mut [u8], filled: &mut usize) -> io::Result<()> {
    while *filled < chunk.len() {
        match reader.read(&mut chunk[*filled..]) {
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
            Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof)),
            Ok(len) => *filled += len,
        }
    }
    Ok(())
}
