//! `esync check`: report which files of a list are in the index.
//!
//! For each input list a `<stem>_log.txt` is written to the output
//! directory: a summary line followed by the paths that were not found.
//! `esync report` reads these logs back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use archive_sync_core::index::SearchIndex;
use archive_sync_core::reconcile::ResponseMode;
use archive_sync_core::updater::IndexUpdater;

use crate::config::Config;
use crate::filter::filter_for_index;
use crate::logs::read_file_list;
use crate::outcome::RunReport;
use crate::progress::{ProgressReporter, UnitProgress};

/// Suffix of the per-list result files.
pub const CHECK_LOG_SUFFIX: &str = "_log.txt";

/// Result of checking one file list.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub total: usize,
    /// Files with at least one matching document.
    pub indexed: usize,
    pub missing: Vec<String>,
    /// Files matching more than one document; counted as indexed.
    pub ambiguous: Vec<String>,
}

impl CheckOutcome {
    pub fn percent_missing(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.missing.len() as f64 / self.total as f64 * 100.0
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Summary: Total Files in Spot: {} Total Indexed: {} Total Missing: {} Percentage Missing: {:.2}%",
            self.total,
            self.indexed,
            self.missing.len(),
            self.percent_missing()
        )
    }
}

/// Input lists: the single `file`, or every regular file directly in
/// `directory`, sorted by name.
pub fn collect_lists(file: Option<&Path>, directory: Option<&Path>) -> Result<Vec<PathBuf>> {
    match (file, directory) {
        (Some(file), None) => Ok(vec![file.to_path_buf()]),
        (None, Some(dir)) => {
            if !dir.is_dir() {
                bail!("Not a directory: {}", dir.display());
            }
            let mut lists: Vec<PathBuf> = WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            lists.sort();
            Ok(lists)
        }
        _ => bail!("Give exactly one of --file or --directory"),
    }
}

/// Name of the result file for `list`: `a.txt` gives `a_log.txt`.
pub fn check_log_name(list: &Path) -> String {
    let name = list
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name.split(".txt").next().unwrap_or(&name);
    format!("{}{}", stem, CHECK_LOG_SUFFIX)
}

pub fn write_check_log(output_dir: &Path, list: &Path, outcome: &CheckOutcome) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(check_log_name(list));

    let mut content = outcome.summary_line();
    content.push('\n');
    for missing in &outcome.missing {
        content.push_str(missing);
        content.push('\n');
    }
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Check one list against the index.
pub async fn check_list(
    config: &Config,
    index: &dyn SearchIndex,
    reporter: &dyn ProgressReporter,
    list: &Path,
    filter: bool,
) -> Result<CheckOutcome> {
    let mut files = read_file_list(list)?;
    if filter {
        files = filter_for_index(config, files)?;
    }

    let profile = config.profile()?;
    let progress = UnitProgress::start(reporter, list.display().to_string(), files.len());
    let updater = IndexUpdater::new(index, config.batch.blocksize)?.with_progress(&progress);
    let found = updater
        .check_files_existence(&profile.query, &files, ResponseMode::Filtered)
        .await?;

    Ok(CheckOutcome {
        total: files.len(),
        indexed: found.present.len() + found.ambiguous.len(),
        missing: found.absent,
        ambiguous: found.ambiguous.into_iter().map(|a| a.item).collect(),
    })
}

/// Check every list, writing one result file per list.
pub async fn run_check(
    config: &Config,
    index: &dyn SearchIndex,
    reporter: &dyn ProgressReporter,
    lists: &[PathBuf],
    output: Option<&Path>,
    filter: bool,
) -> Result<RunReport> {
    let output_dir = output.unwrap_or(config.output.dir.as_path());
    let mut report = RunReport::new(config.batch.continue_on_error);

    for list in lists {
        let unit = list.display().to_string();
        let result = match check_list(config, index, reporter, list, filter).await {
            Ok(outcome) => write_check_log(output_dir, list, &outcome).map(|_| outcome),
            Err(e) => Err(e),
        };
        if let Some(outcome) = report.record(&unit, result, CheckOutcome::summary_line)? {
            for item in &outcome.ambiguous {
                println!("ambiguous: {}", item);
            }
        }
    }

    Ok(report)
}
