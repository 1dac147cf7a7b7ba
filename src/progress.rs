//! Progress reporting for archive operations
//!
//! Operations never decide on their own how chatty they are. They report
//! [`ProgressEvent`]s to an injected [`Observer`]; the caller picks whether
//! that means structured logs, a progress bar or nothing at all.

/// A single step of a pack, unpack, index or export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    /// A file was appended to an archive
    EntryWritten { path: &'a str, size: u64 },
    /// A regular file was written during unpack
    EntryExtracted { path: &'a str, size: u64 },
    /// An entry kind unpack does not materialize (links, devices, FIFOs)
    EntrySkipped { path: &'a str, typeflag: u8 },
    /// An index was built from an archive
    IndexBuilt { entries: usize },
    /// Another chunk of an export landed in the destination
    ChunkTransferred { entry: &'a str, done: u64, total: u64 },
    /// A chunk read failed and is being resumed on a fresh handle
    ChunkRetried { entry: &'a str, position: u64, attempt: u32 },
    /// The destination already had the expected size, nothing was transferred
    ExportSkipped { entry: &'a str },
}

/// Receives progress events. Implementations must be cheap; they run inline.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &ProgressEvent<'_>);
}

/// Any `Fn(&ProgressEvent)` closure is an observer
impl<F> Observer for F
where
    F: Fn(&ProgressEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent<'_>) {
        self(event)
    }
}

/// Emits every event as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        match *event {
            ProgressEvent::EntryWritten { path, size } => {
                tracing::debug!(path, size, "added entry")
            }
            ProgressEvent::EntryExtracted { path, size } => {
                tracing::debug!(path, size, "extracted entry")
            }
            ProgressEvent::EntrySkipped { path, typeflag } => {
                let typeflag = char::from(typeflag);
                tracing::warn!(path, typeflag = %typeflag, "skipping unsupported entry type")
            }
            ProgressEvent::IndexBuilt { entries } => tracing::info!(entries, "index built"),
            ProgressEvent::ChunkTransferred { entry, done, total } => {
                tracing::trace!(entry, done, total, "chunk transferred")
            }
            ProgressEvent::ChunkRetried { entry, position, attempt } => {
                tracing::warn!(entry, position, attempt, "chunk read failed, retrying")
            }
            ProgressEvent::ExportSkipped { entry } => {
                tracing::info!(entry, "destination already has the expected size, skipping")
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl Observer for SilentObserver {
    fn on_event(&self, _event: &ProgressEvent<'_>) {}
}
