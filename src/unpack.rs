//! # Unpack
//!
//! Full extraction of an archive into `<destination>/<archive name>/`.
//! Entry paths are validated before anything is written for them: absolute
//! paths, `..` segments and drive prefixes abort the extraction instead of
//! being rewritten into something harmless-looking.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::config::invalid_input;
use crate::error::{IoResultExt, Result, TarseekError};
use crate::fsx;
use crate::header::TypeFlag;
use crate::progress::{Observer, ProgressEvent};
use crate::reader::TarReader;

/// Extracts every entry of `archive_path` below `destination_dir/<archive name>`
/// and returns that extraction root.
///
/// When `<archive name>` already exists there as a file (unpacking next to the
/// archive itself), the root is `destination_dir/<archive stem>` instead.
pub fn unpack(
    archive_path: &Path,
    destination_dir: &Path,
    observer: &dyn Observer,
) -> Result<PathBuf> {
    let root = extraction_root(archive_path, destination_dir)?;

    let file = File::open(archive_path).at(archive_path)?;
    let mut reader = TarReader::new(BufReader::new(file), archive_path)?;
    fs::create_dir_all(&root).at(&root)?;

    let mut extracted = 0usize;
    while let Some(entry) = reader.next_entry()? {
        let relative = safe_relative_path(&entry.path)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);

        match entry.header.typeflag {
            TypeFlag::DIRECTORY => {
                fs::create_dir_all(&target).at(&target)?;
            }
            flag if TypeFlag::is_regular(flag) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).at(parent)?;
                }
                let mut out = BufWriter::new(File::create(&target).at(&target)?);
                let copied = io::copy(&mut reader.data(&entry)?, &mut out).at(&target)?;
                if copied != entry.size {
                    return Err(TarseekError::format(
                        archive_path,
                        format!(
                            "entry '{}' ended after {} of {} bytes",
                            entry.path, copied, entry.size
                        ),
                    ));
                }
                out.flush().at(&target)?;
                drop(out);
                if let Some(mode) = entry.header.mode {
                    fsx::set_unix_permissions(&target, mode).at(&target)?;
                }
                extracted += 1;
                let event = ProgressEvent::EntryExtracted { path: &entry.path, size: entry.size };
                observer.on_event(&event);
            }
            flag => {
                let event = ProgressEvent::EntrySkipped { path: &entry.path, typeflag: flag };
                observer.on_event(&event);
            }
        }
    }

    tracing::info!(
        archive = %archive_path.display(),
        root = %root.display(),
        files = extracted,
        "archive unpacked"
    );
    Ok(root)
}

fn extraction_root(archive_path: &Path, destination_dir: &Path) -> Result<PathBuf> {
    let name = archive_path
        .file_name()
        .ok_or_else(|| invalid_input(archive_path, "archive path has no file name"))?;
    let root = destination_dir.join(name);
    if !root.is_file() {
        return Ok(root);
    }
    match archive_path.file_stem().filter(|stem| *stem != name) {
        Some(stem) => Ok(destination_dir.join(stem)),
        None => Err(invalid_input(&root, "extraction root exists and is a file")),
    }
}

/// Turns an archive entry path into a relative path that stays below the extraction root.
pub(crate) fn safe_relative_path(raw: &str) -> Result<PathBuf> {
    let rejected = || TarseekError::UnsafePath { path: raw.to_string() };
    if raw.starts_with('/') || has_drive_prefix(raw) {
        return Err(rejected());
    }

    let mut out = PathBuf::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(rejected()),
            part => {
                // Root and prefix components survive the split on Windows
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(name)), None) => out.push(name),
                    _ => return Err(rejected()),
                }
            }
        }
    }
    Ok(out)
}

/// `C:` style prefixes, which only `Path` on Windows recognises on its own
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
