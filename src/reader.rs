//! Sequential walk over the records of a tar stream.
//!
//! [`TarReader`] visits headers only: after each record it seeks straight to
//! the next header, so indexing a large archive touches a few bytes per entry.
//! Callers that do want the contents (unpack) ask for a
//! [`TarReader::data`] view of the current record.
//!
//! PAX (`x`) and GNU long-name (`L`) records are folded into the record they
//! describe and are never yielded themselves.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::error::{IoResultExt, Result, TarseekError};
use crate::header::{self, Block, Header, HeaderError, TypeFlag, BLOCK_LEN};

/// Extension payloads larger than this are treated as corrupt
const MAX_EXTENSION_LEN: u64 = 1 << 20;

/// One logical record of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub header: Header,
    /// The record's path as stored, after PAX / GNU long-name overrides
    pub path: String,
    /// Byte offset of the first data byte within the archive
    pub data_offset: u64,
    /// Number of data bytes
    pub size: u64,
}

/// Overrides collected from extension records for the next real record
#[derive(Default)]
struct Pending {
    path: Option<String>,
    size: Option<u64>,
}

pub struct TarReader<R> {
    inner: R,
    archive: PathBuf,
    len: u64,
    next_header: u64,
    done: bool,
}

impl<R: Read + Seek> TarReader<R> {
    /// Wraps `inner`; `archive` is only used to label errors.
    pub fn new(mut inner: R, archive: impl Into<PathBuf>) -> Result<Self> {
        let archive = archive.into();
        let len = inner.seek(SeekFrom::End(0)).at(&archive)?;
        Ok(Self { inner, archive, len, next_header: 0, done: false })
    }

    /// Returns the next file, directory or link record, `None` at the end-of-archive marker.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        if self.done {
            return Ok(None);
        }
        let mut pending = Pending::default();
        loop {
            let position = self.next_header;
            let block = self.read_block(position)?;
            let header = match Header::parse(&block) {
                Ok(header) => header,
                Err(HeaderError::EmptyHeader) => {
                    // The second zero block is optional in practice
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => return Err(self.corrupt(format!("{} at offset {}", e, position))),
            };

            let is_extension = matches!(
                header.typeflag,
                TypeFlag::PAX_SINGLE
                    | TypeFlag::PAX_GLOBAL
                    | TypeFlag::GNU_LONGNAME
                    | TypeFlag::GNU_LONGLINK
            );
            let data_offset = position + BLOCK_LEN as u64;
            let size = match pending.size {
                Some(size) if !is_extension => size,
                _ => header.size,
            };
            self.next_header = self.skip_data(data_offset, size)?;

            match header.typeflag {
                TypeFlag::PAX_SINGLE => {
                    let payload = self.read_extension(data_offset, size)?;
                    let records = header::parse_pax(&payload)
                        .map_err(|e| self.corrupt(format!("{} at offset {}", e, position)))?;
                    for (key, value) in records {
                        match key.as_str() {
                            "path" => pending.path = Some(value),
                            "size" => {
                                let size = value.parse().map_err(|_| {
                                    self.corrupt(format!("invalid pax size at offset {}", position))
                                })?;
                                pending.size = Some(size);
                            }
                            _ => {}
                        }
                    }
                }
                TypeFlag::GNU_LONGNAME => {
                    let payload = self.read_extension(data_offset, size)?;
                    let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
                    let name = String::from_utf8(payload[..end].to_vec()).map_err(|_| {
                        self.corrupt(format!("long name is not UTF-8 at offset {}", position))
                    })?;
                    pending.path = Some(name);
                }
                TypeFlag::PAX_GLOBAL | TypeFlag::GNU_LONGLINK => {}
                _ => {
                    let path = pending.path.take().unwrap_or_else(|| header.path.clone());
                    if path.is_empty() {
                        let reason = format!("empty entry name at offset {}", position);
                        return Err(self.corrupt(reason));
                    }
                    return Ok(Some(TarEntry { header, path, data_offset, size }));
                }
            }
        }
    }

    /// A reader over exactly the data bytes of `entry`.
    pub fn data(&mut self, entry: &TarEntry) -> Result<io::Take<&mut R>> {
        self.inner.seek(SeekFrom::Start(entry.data_offset)).at(&self.archive)?;
        Ok((&mut self.inner).take(entry.size))
    }

    fn read_block(&mut self, position: u64) -> Result<Block> {
        if position == self.len {
            let reason = "truncated archive: missing end-of-archive marker".to_string();
            return Err(self.corrupt(reason));
        }
        if position + BLOCK_LEN as u64 > self.len {
            return Err(self.corrupt(format!("truncated header at offset {}", position)));
        }
        let mut block = [0u8; BLOCK_LEN];
        self.inner.seek(SeekFrom::Start(position)).at(&self.archive)?;
        self.inner.read_exact(&mut block).at(&self.archive)?;
        Ok(block)
    }

    /// Checks that the data region fits the archive and returns the next header offset
    fn skip_data(&self, data_offset: u64, size: u64) -> Result<u64> {
        let data_end = data_offset.checked_add(size);
        match data_end {
            Some(end) if end <= self.len => Ok(data_offset + header::padded_len(size)),
            _ => Err(self.corrupt(format!(
                "truncated archive: entry data at offset {} extends past end of file",
                data_offset
            ))),
        }
    }

    fn read_extension(&mut self, data_offset: u64, size: u64) -> Result<Vec<u8>> {
        if size > MAX_EXTENSION_LEN {
            let reason = format!("oversized extension record at offset {}", data_offset);
            return Err(self.corrupt(reason));
        }
        let mut payload = vec![0u8; size as usize];
        self.inner.seek(SeekFrom::Start(data_offset)).at(&self.archive)?;
        self.inner.read_exact(&mut payload).at(&self.archive)?;
        Ok(payload)
    }

    fn corrupt(&self, reason: String) -> TarseekError {
        TarseekError::format(&self.archive, reason)
    }
}
