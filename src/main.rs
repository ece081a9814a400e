//! # esync
//!
//! Command-line interface for archive-sync.
//!
//! ## Usage
//!
//! ```bash
//! esync --config ./config/esync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `esync check` | Report which files of one or more lists are indexed |
//! | `esync location` | Set the on-disk / on-tape location of listed files |
//! | `esync checksums` | Update indexed MD5 checksums from a log or the files |
//! | `esync deposit` | Apply a deposit log: checksums, deletions, directory documents |
//! | `esync download` | Dump every document of the index as JSON files |
//! | `esync report` | Tabulate the result files written by `check` |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use archive_sync::checksums::{self, ChecksumSource};
use archive_sync::client::HttpIndex;
use archive_sync::config::{self, Overrides};
use archive_sync::deposit::{self, DepositOptions};
use archive_sync::download::{self, DEFAULT_PAGE_SIZE};
use archive_sync::logs::read_file_list;
use archive_sync::progress::ProgressMode;
use archive_sync::{check, location, summary};
use archive_sync_core::index::SearchIndex;
use archive_sync_core::profile::Location;

/// Keep an Elasticsearch file index in step with a filesystem archive.
///
/// All commands except `report` read a TOML configuration file naming the
/// index. See `config/esync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "esync",
    about = "Keep an Elasticsearch file index in step with a filesystem archive",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/esync.toml")]
    config: PathBuf,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Override `index.name`.
    #[arg(long, global = true)]
    index: Option<String>,

    /// Override `index.url`.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Override `batch.blocksize`: sub-requests per `_msearch` / `_bulk` call.
    #[arg(long, global = true)]
    blocksize: Option<usize>,

    /// Progress on stderr: `off`, `human`, or `json`. Defaults to human on a TTY.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check which files of a list are in the index.
    ///
    /// Writes `<list>_log.txt` to the output directory: a summary line
    /// followed by the paths that were not found.
    Check {
        /// File list, one path per line.
        #[arg(long, conflicts_with = "directory")]
        file: Option<PathBuf>,

        /// Directory of file lists; each list is checked separately.
        #[arg(long)]
        directory: Option<PathBuf>,

        /// Where to write result files (default: `[output].dir`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Drop paths outside the index's roots in the filter file.
        #[arg(long)]
        filter: bool,
    },

    /// Set the location of every indexed file in a list.
    Location {
        /// File list, one path per line.
        #[arg(long)]
        file: PathBuf,

        /// Mark the files as on disk.
        #[arg(long, conflicts_with = "on_tape")]
        on_disk: bool,

        /// Mark the files as on tape.
        #[arg(long)]
        on_tape: bool,

        /// Write the paths not found in the index to `<list>_missing.txt`.
        #[arg(long)]
        missing: bool,

        /// Drop paths outside the index's roots in the filter file.
        #[arg(long)]
        filter: bool,
    },

    /// Update indexed MD5 checksums where they differ.
    ///
    /// Checksums come from a checksum log (`--log` or `--spot`) or from
    /// hashing the files of a list (`--file --calculate`).
    Checksums {
        /// Checksum log file.
        #[arg(long)]
        log: Option<PathBuf>,

        /// Spot whose newest log under `[logs].checksum_dir` is used.
        #[arg(long)]
        spot: Option<String>,

        /// File list to hash; needs `--calculate`.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Archive directory the log's relative paths are under.
        #[arg(long)]
        archive_root: Option<String>,

        /// Compute checksums from the files themselves.
        #[arg(long)]
        calculate: bool,
    },

    /// Apply a deposit log to the index.
    Deposit {
        /// Log name inside `[logs].deposit_dir` (default: newest complete log).
        #[arg(long)]
        log: Option<String>,

        /// Hash deposited files and update their checksums.
        #[arg(long)]
        calculate: bool,

        /// Do not write the marker lists.
        #[arg(long)]
        no_create_files: bool,
    },

    /// Dump every document of the index as one JSON file per id.
    Download {
        /// Documents per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: usize,

        /// Output directory (default: `[output].dir`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also save the index mapping to `mapping.json`.
        #[arg(short, long)]
        mapping: bool,
    },

    /// Summarise the result files written by `check`.
    Report {
        /// Directory holding `*_log.txt` result files.
        #[arg(long)]
        directory: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    // Commands that don't require config
    if let Commands::Report { directory } = &cli.command {
        summary::run_report(directory)?;
        return Ok(());
    }

    let overrides = Overrides {
        url: cli.url.clone(),
        index: cli.index.clone(),
        blocksize: cli.blocksize,
    };
    let cfg = config::load_config_with(&cli.config, &overrides)?;

    let progress = match &cli.progress {
        Some(mode) => ProgressMode::parse(mode)?,
        None => ProgressMode::default_for_tty(),
    };
    let reporter = progress.reporter();
    let index = HttpIndex::from_config(&cfg)?;

    match cli.command {
        Commands::Check {
            file,
            directory,
            output,
            filter,
        } => {
            let lists = check::collect_lists(file.as_deref(), directory.as_deref())?;
            let report = check::run_check(
                &cfg,
                &index,
                reporter.as_ref(),
                &lists,
                output.as_deref(),
                filter,
            )
            .await?;
            println!("{}", report);
            report.finish()?;
        }
        Commands::Location {
            file,
            on_disk,
            on_tape,
            missing,
            filter,
        } => {
            if on_disk == on_tape {
                bail!("Give exactly one of --on-disk or --on-tape");
            }
            location::run_location(
                &cfg,
                &index,
                reporter.as_ref(),
                &file,
                Location::from_on_disk(on_disk),
                missing,
                filter,
            )
            .await?;
        }
        Commands::Checksums {
            log,
            spot,
            file,
            archive_root,
            calculate,
        } => {
            let (unit, source) = match (log.as_deref(), spot.as_deref(), file.as_deref()) {
                (Some(log), None, None) => (
                    log.display().to_string(),
                    ChecksumSource::Log {
                        log,
                        archive_root: archive_root
                            .as_deref()
                            .context("--archive-root is required with --log")?,
                    },
                ),
                (None, Some(spot), None) => (
                    spot.to_string(),
                    ChecksumSource::Spot {
                        spot,
                        archive_root: archive_root
                            .as_deref()
                            .context("--archive-root is required with --spot")?,
                    },
                ),
                (None, None, Some(file)) => {
                    if !calculate {
                        bail!("--file needs --calculate");
                    }
                    (
                        file.display().to_string(),
                        ChecksumSource::Calculate {
                            files: read_file_list(file)?,
                        },
                    )
                }
                _ => bail!("Give exactly one of --log, --spot, or --file"),
            };
            let sums = checksums::load_checksums(&cfg, source)?;
            checksums::run_checksums(&cfg, &index, reporter.as_ref(), &unit, &sums).await?;
        }
        Commands::Deposit {
            log,
            calculate,
            no_create_files,
        } => {
            let options = DepositOptions {
                log,
                calculate,
                create_files: !no_create_files,
            };
            let dirs = HttpIndex::dirs_from_config(&cfg)?;
            let dirs = dirs.as_ref().map(|d| d as &dyn SearchIndex);
            let report = deposit::run_deposit(&cfg, &index, dirs, reporter.as_ref(), &options).await?;
            println!("{}", report);
            report.finish()?;
        }
        Commands::Download {
            size,
            output,
            mapping,
        } => {
            let output = output.unwrap_or_else(|| cfg.output.dir.clone());
            download::run_download(&index, &output, size, mapping).await?;
        }
        Commands::Report { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
