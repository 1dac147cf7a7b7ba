//! # Tar Header Codec
//!
//! Reads and writes the 512-byte header blocks of a tar stream. Writing
//! produces POSIX ustar headers, preceded by a PAX `path` record when a path
//! does not fit the prefix/name split. Reading also understands the old v7
//! layout, the GNU magic, base-256 numeric fields and GNU long names, which is
//! what GNU tar, bsdtar and the `tar` crate emit in practice.
//!
//! Field layout of a header block:
//!
//! | field    | offset | len |
//! |----------|--------|-----|
//! | name     | 0      | 100 |
//! | mode     | 100    | 8   |
//! | uid      | 108    | 8   |
//! | gid      | 116    | 8   |
//! | size     | 124    | 12  |
//! | mtime    | 136    | 12  |
//! | checksum | 148    | 8   |
//! | typeflag | 156    | 1   |
//! | linkname | 157    | 100 |
//! | magic    | 257    | 6   |
//! | version  | 263    | 2   |
//! | uname    | 265    | 32  |
//! | gname    | 297    | 32  |
//! | devmajor | 329    | 8   |
//! | devminor | 337    | 8   |
//! | prefix   | 345    | 155 |

use std::fmt::{self, Display, Formatter};
use std::ops::Range;

/// The length of a tar block
pub const BLOCK_LEN: usize = 512;

/// A raw header block
pub type Block = [u8; BLOCK_LEN];

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const PREFIX: Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

/// The type flags which indicate the record type
pub struct TypeFlag;
impl TypeFlag {
    /// The type flag for a regular file
    pub const REGULAR: u8 = b'0';
    /// Pre-POSIX archives mark regular files with a NUL byte
    pub const REGULAR_OLD: u8 = 0;
    pub const HARDLINK: u8 = b'1';
    pub const SYMLINK: u8 = b'2';
    pub const CHAR_DEV: u8 = b'3';
    pub const BLOCK_DEV: u8 = b'4';
    pub const DIRECTORY: u8 = b'5';
    pub const FIFO: u8 = b'6';
    /// Contiguous file; readers treat it as a regular file
    pub const CONTIGUOUS: u8 = b'7';
    /// A pax interchange record that only affects the next file
    pub const PAX_SINGLE: u8 = b'x';
    /// A pax interchange record that affects all subsequent files
    pub const PAX_GLOBAL: u8 = b'g';
    /// GNU extension: the payload is the long name of the next record
    pub const GNU_LONGNAME: u8 = b'L';
    /// GNU extension: the payload is the long link name of the next record
    pub const GNU_LONGLINK: u8 = b'K';

    /// Whether records of this type carry file contents.
    pub fn is_regular(flag: u8) -> bool {
        matches!(flag, Self::REGULAR | Self::REGULAR_OLD | Self::CONTIGUOUS)
    }
}

/// A header-level decoding or encoding failure
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum HeaderError {
    /// The value cannot be represented in a ustar header
    ApiMisuse(&'static str),
    /// The tar header contains invalid data
    InvalidData(&'static str),
    /// The tar header field might be valid but contains an unsupported value
    Unsupported(&'static str),
    /// An empty (all zero) header was found, usually part of the end-of-archive marker
    EmptyHeader,
}
impl Display for HeaderError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            HeaderError::ApiMisuse(msg) | HeaderError::InvalidData(msg) => f.write_str(msg),
            HeaderError::Unsupported(msg) => f.write_str(msg),
            HeaderError::EmptyHeader => f.write_str("empty header block"),
        }
    }
}
impl std::error::Error for HeaderError {}

/// A decoded tar header
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Header {
    /// The record's path, with the ustar prefix already joined
    pub path: String,
    /// The record's access mode bits (e.g. 0o644)
    pub mode: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    /// The payload length in bytes
    pub size: u64,
    /// Modification time in seconds since the Unix epoch
    pub mtime: Option<u64>,
    pub typeflag: u8,
    pub linkname: Option<String>,
}

impl Header {
    /// Creates a header for a regular file record.
    pub fn regular(path: impl Into<String>, size: u64) -> Self {
        Self { path: path.into(), size, typeflag: TypeFlag::REGULAR, ..Self::default() }
    }

    /// Parses a raw block into a header and verifies its checksum
    pub fn parse(block: &Block) -> Result<Self, HeaderError> {
        if block.iter().all(|b| *b == 0) {
            return Err(HeaderError::EmptyHeader);
        }
        let stored = parse_numeric(&block[CHECKSUM])?
            .ok_or(HeaderError::InvalidData("missing header checksum"))?;
        if stored != checksum(block) {
            return Err(HeaderError::InvalidData("header checksum mismatch"));
        }

        // Extension records may leave the name blank
        let name = parse_string(&block[NAME])?.unwrap_or_default();
        // Only POSIX ustar stores a path prefix; GNU reuses that area for other fields
        let path = match (&block[MAGIC] == USTAR_MAGIC, parse_string(&block[PREFIX])?) {
            (true, Some(prefix)) => format!("{}/{}", prefix, name),
            _ => name,
        };

        let mode = parse_numeric(&block[MODE])?
            .map(|m| u32::try_from(m).map_err(|_| HeaderError::InvalidData("mode out of range")))
            .transpose()?;
        let size =
            parse_numeric(&block[SIZE])?.ok_or(HeaderError::InvalidData("missing entry size"))?;

        Ok(Self {
            path,
            mode,
            uid: parse_numeric(&block[UID])?,
            gid: parse_numeric(&block[GID])?,
            size,
            mtime: parse_numeric(&block[MTIME])?,
            typeflag: block[TYPEFLAG],
            linkname: parse_string(&block[LINKNAME])?,
        })
    }

    /// Serializes the header into a ustar block.
    ///
    /// _Note: this can fail because the struct may hold values a ustar header cannot
    /// carry, e.g. a path that cannot be split into a 155 byte prefix and a 100 byte name_
    pub fn to_block(&self) -> Result<Block, HeaderError> {
        let mut block = [0u8; BLOCK_LEN];
        let (prefix, name) = split_path(&self.path)?;
        write_string(&mut block[NAME], name)?;
        write_string(&mut block[PREFIX], prefix)?;

        write_octal(&mut block[MODE], self.mode.map(u64::from))?;
        if let Some(uid) = self.uid {
            write_numeric(&mut block[UID], uid);
        }
        if let Some(gid) = self.gid {
            write_numeric(&mut block[GID], gid);
        }
        write_numeric(&mut block[SIZE], self.size);
        write_numeric(&mut block[MTIME], self.mtime.unwrap_or(0));

        block[TYPEFLAG] = self.typeflag;
        if let Some(link) = &self.linkname {
            write_string(&mut block[LINKNAME], link)?;
        }
        block[MAGIC].copy_from_slice(USTAR_MAGIC);
        block[VERSION].copy_from_slice(USTAR_VERSION);

        // Conventional layout: six octal digits, NUL, space
        let sum = format!("{:06o}\0 ", checksum(&block));
        block[CHECKSUM].copy_from_slice(sum.as_bytes());
        Ok(block)
    }
}

/// Whether `path` can be stored in the name and prefix fields alone
pub fn fits_ustar(path: &str) -> bool {
    split_path(path).is_ok()
}

/// The longest prefix of `path` that fits the name field, cut at a char boundary
pub fn truncated_name(path: &str) -> &str {
    let mut end = path.len().min(NAME.len());
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    &path[..end]
}

/// Encodes one PAX record, `"<len> <key>=<value>\n"`, where `len` counts itself.
pub fn pax_record(key: &str, value: &str) -> Vec<u8> {
    let body = key.len() + value.len() + 3;
    let mut len = body + body.to_string().len();
    if len.to_string().len() > body.to_string().len() {
        len += 1;
    }
    format!("{} {}={}\n", len, key, value).into_bytes()
}

/// Rounds `len` up to the next multiple of the block size
pub fn padded_len(len: u64) -> u64 {
    match len % BLOCK_LEN as u64 {
        0 => len,
        r => len + (BLOCK_LEN as u64 - r),
    }
}

/// Sums the block with the checksum field counted as eight spaces
fn checksum(block: &Block) -> u64 {
    block[..CHECKSUM.start]
        .iter()
        .chain([b' '; 8].iter())
        .chain(block[CHECKSUM.end..].iter())
        .fold(0, |sum, byte| sum + u64::from(*byte))
}

fn split_path(path: &str) -> Result<(&str, &str), HeaderError> {
    if path.len() <= NAME.len() {
        return Ok(("", path));
    }
    // Pick the left-most separator that leaves a name short enough
    path.match_indices('/')
        .map(|(i, _)| (&path[..i], &path[i + 1..]))
        .find(|(prefix, name)| {
            prefix.len() <= PREFIX.len() && name.len() <= NAME.len() && !name.is_empty()
        })
        .ok_or(HeaderError::ApiMisuse("path is too long for a ustar header"))
}

fn parse_string(field: &[u8]) -> Result<Option<String>, HeaderError> {
    let nul = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    if nul == 0 {
        return Ok(None);
    }
    String::from_utf8(field[..nul].to_vec())
        .map(Some)
        .map_err(|_| HeaderError::Unsupported("header field is not UTF-8"))
}

fn write_string(field: &mut [u8], value: &str) -> Result<(), HeaderError> {
    if value.len() > field.len() {
        return Err(HeaderError::ApiMisuse("value does not fit into its header field"));
    }
    field[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

/// Decodes an octal or GNU base-256 numeric field; an all-blank field is `None`
fn parse_numeric(field: &[u8]) -> Result<Option<u64>, HeaderError> {
    if field[0] & 0x80 != 0 {
        if field[0] & 0x40 != 0 {
            return Err(HeaderError::Unsupported("negative base-256 value"));
        }
        let mut num: u64 = u64::from(field[0] & 0x3f);
        for byte in &field[1..] {
            num = num
                .checked_mul(256)
                .and_then(|n| n.checked_add(u64::from(*byte)))
                .ok_or(HeaderError::Unsupported("base-256 value exceeds 64 bits"))?;
        }
        return Ok(Some(num));
    }

    let text = field
        .iter()
        .copied()
        .skip_while(|b| *b == b' ')
        .take_while(|b| *b != 0 && *b != b' ')
        .collect::<Vec<_>>();
    if text.is_empty() {
        return Ok(None);
    }
    let text =
        std::str::from_utf8(&text).map_err(|_| HeaderError::InvalidData("invalid octal number"))?;
    u64::from_str_radix(text, 8)
        .map(Some)
        .map_err(|_| HeaderError::InvalidData("invalid octal number"))
}

/// Writes `width - 1` zero-padded octal digits followed by NUL
fn write_octal(field: &mut [u8], value: Option<u64>) -> Result<(), HeaderError> {
    let Some(value) = value else { return Ok(()) };
    let digits = field.len() - 1;
    let text = format!("{:0width$o}", value, width = digits);
    if text.len() > digits {
        return Err(HeaderError::ApiMisuse("value does not fit into its octal field"));
    }
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
    Ok(())
}

/// Writes octal when the value fits, GNU base-256 otherwise
fn write_numeric(field: &mut [u8], value: u64) {
    if write_octal(field, Some(value)).is_ok() {
        return;
    }
    field.iter_mut().for_each(|b| *b = 0);
    let bytes = value.to_be_bytes();
    let start = field.len() - bytes.len();
    field[start..].copy_from_slice(&bytes);
    field[0] |= 0x80;
}

/// Parses a PAX extended header payload into `(key, value)` pairs.
///
/// Each record is `"<len> <key>=<value>\n"` where `len` counts the whole record.
pub fn parse_pax(mut data: &[u8]) -> Result<Vec<(String, String)>, HeaderError> {
    let mut records = Vec::new();
    while !data.is_empty() && data[0] != 0 {
        let space = data
            .iter()
            .position(|b| *b == b' ')
            .ok_or(HeaderError::InvalidData("malformed pax record"))?;
        let len: usize = std::str::from_utf8(&data[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(HeaderError::InvalidData("malformed pax record length"))?;
        if len <= space + 1 || len > data.len() || data[len - 1] != b'\n' {
            return Err(HeaderError::InvalidData("malformed pax record"));
        }

        let record = &data[space + 1..len - 1];
        let eq = record
            .iter()
            .position(|b| *b == b'=')
            .ok_or(HeaderError::InvalidData("pax record without '='"))?;
        let key = String::from_utf8(record[..eq].to_vec())
            .map_err(|_| HeaderError::Unsupported("pax key is not UTF-8"))?;
        let value = String::from_utf8(record[eq + 1..].to_vec())
            .map_err(|_| HeaderError::Unsupported("pax value is not UTF-8"))?;
        records.push((key, value));
        data = &data[len..];
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_header_parses_back() {
        let header = Header {
            path: "dir/predefined_0.plain".into(),
            mode: Some(0o644),
            uid: Some(0o765),
            gid: Some(0o24),
            size: 0o11,
            mtime: Some(0o13521071532),
            typeflag: TypeFlag::REGULAR,
            linkname: None,
        };
        let block = header.to_block().unwrap();
        assert_eq!(&block[MAGIC], USTAR_MAGIC);
        assert_eq!(Header::parse(&block).unwrap(), header);
    }

    #[test]
    fn long_paths_use_the_prefix_field() {
        let dir = "d".repeat(120);
        let path = format!("{}/file.txt", dir);
        let block = Header::regular(path.clone(), 3).to_block().unwrap();
        assert_eq!(parse_string(&block[NAME]).unwrap().as_deref(), Some("file.txt"));
        assert_eq!(Header::parse(&block).unwrap().path, path);
    }

    #[test]
    fn unsplittable_path_is_rejected() {
        let path = "x".repeat(101);
        assert_eq!(
            Header::regular(path, 0).to_block(),
            Err(HeaderError::ApiMisuse("path is too long for a ustar header"))
        );
    }

    #[test]
    fn corrupted_checksum_is_detected() {
        let mut block = Header::regular("a.txt", 5).to_block().unwrap();
        block[0] = b'b';
        let expected = Err(HeaderError::InvalidData("header checksum mismatch"));
        assert_eq!(Header::parse(&block), expected);
    }

    #[test]
    fn zero_block_is_empty_header() {
        assert_eq!(Header::parse(&[0u8; BLOCK_LEN]), Err(HeaderError::EmptyHeader));
    }

    #[test]
    fn huge_sizes_switch_to_base256() {
        let size = 9 * 1024 * 1024 * 1024u64;
        let block = Header::regular("big.bin", size).to_block().unwrap();
        assert_eq!(block[SIZE.start] & 0x80, 0x80);
        assert_eq!(Header::parse(&block).unwrap().size, size);
    }

    #[test]
    fn space_padded_octal_is_accepted() {
        assert_eq!(parse_numeric(b"   644 \0").unwrap(), Some(0o644));
        assert_eq!(parse_numeric(b"\0\0\0\0\0\0\0\0").unwrap(), None);
    }

    #[test]
    fn pax_records_are_split() {
        let data = b"28 path=some/very/long/name\n11 size=42\n";
        let records = parse_pax(data).unwrap();
        assert_eq!(records[0], ("path".to_string(), "some/very/long/name".to_string()));
        assert_eq!(records[1], ("size".to_string(), "42".to_string()));
    }

    #[test]
    fn pax_records_count_their_own_length() {
        let short = pax_record("path", "a");
        assert_eq!(short, b"9 path=a\n".to_vec());
        // 98 bytes plus a 2 digit length would be 100, which itself needs 3 digits
        let long = pax_record("path", &"v".repeat(91));
        assert_eq!(long.len(), 101);
        assert!(long.starts_with(b"101 path="));
        let parsed = parse_pax(&[short, long].concat()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].1, "v".repeat(91));
    }

    #[test]
    fn blank_names_parse_to_an_empty_path() {
        let mut header = Header::regular("x", 11);
        header.typeflag = TypeFlag::PAX_SINGLE;
        let mut block = header.to_block().unwrap();
        block[NAME].iter_mut().for_each(|b| *b = 0);
        let sum = format!("{:06o}\0 ", checksum(&block));
        block[CHECKSUM].copy_from_slice(sum.as_bytes());
        assert_eq!(Header::parse(&block).unwrap().path, "");
    }

    #[test]
    fn truncated_name_respects_char_boundaries() {
        let path = format!("{}é", "a".repeat(99));
        assert_eq!(truncated_name(&path), "a".repeat(99));
        assert_eq!(truncated_name("short"), "short");
        assert!(!fits_ustar(&"n".repeat(124)));
        assert!(fits_ustar(&format!("{}/f.txt", "d".repeat(150))));
    }

    #[test]
    fn padded_len_rounds_to_blocks() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 512);
        assert_eq!(padded_len(512), 512);
        assert_eq!(padded_len(513), 1024);
    }
}
