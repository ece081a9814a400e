//! `esync checksums`: bring indexed MD5 checksums in line with the archive.
//!
//! Checksums come either from a checksum log or from hashing the files
//! directly. Only documents whose stored checksum differs are updated.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use archive_sync_core::index::SearchIndex;
use archive_sync_core::updater::{ChecksumUpdate, IndexUpdater};

use crate::config::Config;
use crate::logs::ChecksumLog;
use crate::progress::{ProgressReporter, UnitProgress};

const READ_CHUNK: usize = 4096;

/// Hex MD5 of the file at `path`, or `None` if it does not exist.
pub fn file_md5(path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let mut context = md5::Context::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(Some(format!("{:x}", context.compute())))
}

/// Checksums for `files`, computed from the files themselves.
///
/// Unreadable files get an empty checksum and are skipped by the update.
pub fn calculate_checksums(files: &[String]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|path| {
            let sum = match file_md5(Path::new(path)) {
                Ok(Some(sum)) => sum,
                Ok(None) => {
                    warn!(path = %path, "no such file");
                    String::new()
                }
                Err(e) => {
                    warn!(path = %path, "could not checksum: {:#}", e);
                    String::new()
                }
            };
            (path.clone(), sum)
        })
        .collect()
}

/// Where the checksums for a run come from.
pub enum ChecksumSource<'a> {
    /// A checksum log and the archive directory its paths are relative to.
    Log { log: &'a Path, archive_root: &'a str },
    /// The newest log of a spot under `[logs].checksum_dir`.
    Spot { spot: &'a str, archive_root: &'a str },
    /// Hash the files listed in a file list.
    Calculate { files: Vec<String> },
}

pub fn load_checksums(config: &Config, source: ChecksumSource<'_>) -> Result<BTreeMap<String, String>> {
    Ok(match source {
        ChecksumSource::Log { log, archive_root } => {
            ChecksumLog::load(log, archive_root)?.into_map()
        }
        ChecksumSource::Spot { spot, archive_root } => ChecksumLog::latest(
            &config.logs.checksum_dir,
            spot,
            &config.logs.checksum_prefix,
            archive_root,
        )?
        .into_map(),
        ChecksumSource::Calculate { files } => calculate_checksums(&files),
    })
}

pub async fn run_checksums(
    config: &Config,
    index: &dyn SearchIndex,
    reporter: &dyn ProgressReporter,
    unit: &str,
    checksums: &BTreeMap<String, String>,
) -> Result<ChecksumUpdate> {
    let profile = config.profile()?;
    let progress = UnitProgress::start(reporter, unit, checksums.len());
    let updater = IndexUpdater::new(index, config.batch.blocksize)?.with_progress(&progress);
    let result = updater.update_checksums(checksums, &profile).await?;

    println!("{}", result.summary);
    if !result.unavailable.is_empty() {
        println!("{} files had no checksum", result.unavailable.len());
    }
    Ok(result)
}
