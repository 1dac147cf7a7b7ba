//! Main entry point for the tarseek CLI app

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tarseek::cli::{self, Args, Commands};
use tarseek::{api, ArchiveConfig, ExclusionList, ExportOptions, ExportOutcome, TracingObserver};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let args = cli::run().unwrap_or_else(|e| e.exit());
    init_logging(&args);

    match run_app(args.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn config_for(archive: &Path, index: Option<PathBuf>) -> ArchiveConfig {
    let config = ArchiveConfig::for_archive(archive);
    match index {
        Some(index) => config.with_index_path(index),
        None => config,
    }
}

fn run_app(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let observer = TracingObserver;
    match command {
        Commands::Pack { source, output, exclude, with_index, index } => {
            let mut config = match output {
                Some(archive) => ArchiveConfig::for_archive(archive),
                None => ArchiveConfig::for_directory(&source)?,
            };
            let write_index = with_index || index.is_some();
            if let Some(index) = index {
                config = config.with_index_path(index);
            }
            let exclusions = exclude.as_deref().map(ExclusionList::parse).unwrap_or_default();
            if write_index {
                let index_path =
                    api::pack_directory_with_index(&source, &config, &exclusions, &observer)?;
                println!("{}", config.archive_path.display());
                println!("{}", index_path.display());
            } else {
                let archive = api::pack_directory(&source, &config, &exclusions, &observer)?;
                println!("{}", archive.display());
            }
        }
        Commands::Unpack { archive, output } => {
            let root = api::unpack_archive(&archive, output.as_deref(), &observer)?;
            println!("{}", root.display());
        }
        Commands::Index { archive, index } => {
            let index_path = api::create_index(&config_for(&archive, index), &observer)?;
            println!("{}", index_path.display());
        }
        Commands::List { archive, index } => {
            for path in api::list_files(&config_for(&archive, index))? {
                println!("{}", path);
            }
        }
        Commands::Exists { archive, file, index } => {
            let exists = api::file_exists(&config_for(&archive, index), &file)?;
            println!("{}", exists);
            if !exists {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Size { archive, file, index } => {
            println!("{}", api::file_size(&config_for(&archive, index), &file)?);
        }
        Commands::Info { archive, file, index } => {
            let entry = api::file_info(&config_for(&archive, index), &file)?;
            let record = serde_json::json!({
                "path": entry.path,
                "offset": entry.offset,
                "size": entry.size,
                "mode": entry.mode,
                "mtime": entry.mtime,
            });
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Export { archive, file, destination, index, chunk_size, force, retries } => {
            let options = ExportOptions::default()
                .with_chunk_size(chunk_size)
                .with_force_overwrite(force)
                .with_max_attempts(retries);
            let outcome = export(&archive, &file, &destination, index, &options, &observer)?;
            match outcome {
                ExportOutcome::Transferred { bytes } => {
                    println!("exported {} bytes to {}", bytes, destination.display())
                }
                ExportOutcome::Skipped => println!("{} is up to date", destination.display()),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn export(
    archive: &str,
    file: &str,
    destination: &Path,
    index: Option<PathBuf>,
    options: &ExportOptions,
    observer: &TracingObserver,
) -> Result<ExportOutcome, Box<dyn std::error::Error>> {
    if archive.starts_with("http://") || archive.starts_with("https://") {
        return export_remote(archive, file, destination, index, options, observer);
    }
    let config = config_for(Path::new(archive), index);
    Ok(api::export_file(&config, file, destination, options, observer)?)
}

#[cfg(feature = "remote")]
fn export_remote(
    url: &str,
    file: &str,
    destination: &Path,
    index: Option<PathBuf>,
    options: &ExportOptions,
    observer: &TracingObserver,
) -> Result<ExportOutcome, Box<dyn std::error::Error>> {
    let index_path = index.ok_or("--index is required when exporting from a URL")?;
    let index = tarseek::ArchiveIndex::load(url, &index_path)?;
    let source = tarseek::source::HttpSource::new(url)?;
    Ok(tarseek::export::export(&source, &index, file, destination, options, observer)?)
}

#[cfg(not(feature = "remote"))]
fn export_remote(
    url: &str,
    _file: &str,
    _destination: &Path,
    _index: Option<PathBuf>,
    _options: &ExportOptions,
    _observer: &TracingObserver,
) -> Result<ExportOutcome, Box<dyn std::error::Error>> {
    Err(format!("cannot export from {}: built without the `remote` feature", url).into())
}
