//! `esync location`: mark the files of a list as on disk or on tape.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use archive_sync_core::index::SearchIndex;
use archive_sync_core::profile::Location;
use archive_sync_core::updater::{IndexUpdater, LocationUpdate};

use crate::config::Config;
use crate::filter::filter_for_index;
use crate::logs::{read_file_list, write_file_list};
use crate::progress::{ProgressReporter, UnitProgress};

/// Update the location of every indexed file in `list`.
///
/// With `write_missing`, the paths not found in the index are written to
/// `<output>/<list stem>_missing.txt`.
pub async fn run_location(
    config: &Config,
    index: &dyn SearchIndex,
    reporter: &dyn ProgressReporter,
    list: &Path,
    location: Location,
    write_missing: bool,
    filter: bool,
) -> Result<LocationUpdate> {
    let mut files = read_file_list(list)?;
    if filter {
        files = filter_for_index(config, files)?;
    }
    let profile = config.profile()?;

    let progress = UnitProgress::start(reporter, list.display().to_string(), files.len());
    let updater = IndexUpdater::new(index, config.batch.blocksize)?.with_progress(&progress);
    let result = updater.update_location(&files, &profile, location).await?;

    println!("{}", result.summary);
    for item in &result.ambiguous {
        warn!(path = %item.item, hits = item.hits, "matched more than one document");
    }
    for failed in &result.summary.report.failed_items {
        warn!(id = %failed.id, status = failed.status, "update failed: {}", failed.error);
    }

    if write_missing && !result.missing.is_empty() {
        let path = write_missing_list(&config.output.dir, list, &result.missing)?;
        println!("Missing files written to {}", path.display());
    }

    Ok(result)
}

fn write_missing_list(output_dir: &Path, list: &Path, missing: &[String]) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let stem = list
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "files".to_string());
    let path = output_dir.join(format!("{}_missing.txt", stem));
    write_file_list(&path, missing)?;
    Ok(path)
}
