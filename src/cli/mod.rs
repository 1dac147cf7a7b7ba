use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CHUNK_SIZE_ENV, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Pack a directory into a tar archive.
    #[command(alias = "c")]
    Pack {
        /// The directory to pack.
        #[arg(required = true)]
        source: PathBuf,

        /// The archive to create. Defaults to <cwd>/<dirname>.tar.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Semicolon-separated file-name suffixes to leave out (e.g. ".log;.tmp").
        #[arg(short, long)]
        exclude: Option<String>,

        /// Also write the offset index next to the archive.
        #[arg(long)]
        with_index: bool,

        /// Where to write the index. Implies --with-index.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Extract every entry of an archive.
    #[command(alias = "x")]
    Unpack {
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory to extract into; a folder named after the archive file is
        /// created inside it (its stem if a file already has that name). Defaults to
        /// the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the offset index of an existing archive.
    Index {
        #[arg(required = true)]
        archive: PathBuf,

        /// Where to write the index. Defaults to the archive path with a .json extension.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// List the files recorded in an archive's index.
    #[command(alias = "l")]
    List {
        #[arg(required = true)]
        archive: PathBuf,

        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Exit successfully if the index contains the file, with status 1 otherwise.
    Exists {
        archive: PathBuf,
        file: String,
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the size in bytes of a file in the archive.
    Size {
        archive: PathBuf,
        file: String,
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the index record of a file as JSON.
    Info {
        archive: PathBuf,
        file: String,
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Copy a single file out of the archive without unpacking it.
    Export {
        /// A local archive, or an http(s) URL when built with the `remote` feature.
        archive: String,
        file: String,
        destination: PathBuf,

        /// The index to use. Required for remote archives.
        #[arg(long)]
        index: Option<PathBuf>,

        /// Bytes per streamed chunk.
        #[arg(long, env = CHUNK_SIZE_ENV, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Transfer even if the destination already has the expected size.
        #[arg(short, long)]
        force: bool,

        /// Attempts per chunk before giving up.
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        retries: u32,
    },
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Result<Args, clap::Error> {
    Args::try_parse()
}
