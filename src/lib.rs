//! # tarseek
//!
//! Pack directories into plain tar archives and pull single files back out
//! without unpacking the whole thing.
//!
//! Next to each archive lives a JSON index that maps every file path to the
//! byte offset and length of its data. With the index at hand an export is one
//! seek and one bounded read, which also works for archives that sit behind a
//! slow or flaky network link.
//!
//! ## Key Modules
//!
//! - [`writer`]: walks a directory and writes a ustar archive, recording offsets.
//! - [`index`]: builds, saves, loads and queries the offset index.
//! - [`export`]: chunked, retrying random-access export of one entry.
//! - [`unpack`]: full extraction with path-traversal protection.
//! - [`header`] and [`reader`]: the tar block codec shared by all of the above.
//! - [`api`]: config-driven entry points used by the `tarseek` binary.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use tarseek::{api, ArchiveConfig, ExclusionList, ExportOptions, TracingObserver};
//!
//! # fn main() -> tarseek::Result<()> {
//! let config = ArchiveConfig::for_archive("photos.tar");
//! let exclusions = ExclusionList::parse(".tmp");
//! api::pack_directory_with_index(Path::new("photos"), &config, &exclusions, &TracingObserver)?;
//! let options = ExportOptions::default();
//! let dest = Path::new("beach.jpg");
//! api::export_file(&config, "2024/beach.jpg", dest, &options, &TracingObserver)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod header;
pub mod index;
pub mod progress;
pub mod reader;
pub mod source;
pub mod unpack;
pub mod writer;

// Cross-platform filesystem helpers
pub mod fsx;

pub use config::{ArchiveConfig, ExportOptions};
pub use error::{ErrorKind, Result, TarseekError};
pub use export::ExportOutcome;
pub use index::{build_index, ArchiveEntry, ArchiveIndex};
pub use progress::{Observer, ProgressEvent, SilentObserver, TracingObserver};
pub use source::{ArchiveSource, LocalSource};
pub use writer::{pack, ArchiveWriter, ExclusionList};
