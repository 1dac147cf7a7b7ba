//! Cross-platform filesystem helpers.
//!
//! Unix permission bits are carried in tar headers. On other platforms they are
//! neither read nor restored so that archives stay portable between systems.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[cfg(unix)]
/// Returns the POSIX permission bits of `meta`.
pub fn maybe_unix_mode(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn maybe_unix_mode(_meta: &Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op: POSIX permission bits are not preserved.
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Modification time in whole seconds since the Unix epoch, if the platform reports one.
pub fn mtime_secs(meta: &Metadata) -> Option<u64> {
    meta.modified().ok()?.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(unix)]
/// Numeric owner and group of `meta`.
pub fn owner(meta: &Metadata) -> (Option<u64>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    (Some(u64::from(meta.uid())), Some(u64::from(meta.gid())))
}

#[cfg(not(unix))]
pub fn owner(_meta: &Metadata) -> (Option<u64>, Option<u64>) {
    (None, None)
}
