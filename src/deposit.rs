//! `esync deposit`: apply one deposit log to the index.
//!
//! A deposit log is handled as separate units of work, each guarded by a
//! marker list in the output directory:
//!
//! | Unit | Marker | Work |
//! |------|--------|------|
//! | deposits | `<log>_DEPOSIT.txt` | report deposits not yet indexed; optionally update their checksums |
//! | removals | `<log>_REMOVE.txt` | delete removed files from the index |
//! | new directories | `<log>_MKDIR.txt` | index a document per created directory |
//! | removed directories | `<log>_RMDIR.txt` | delete directory documents |
//! | readmes | `<log>_README.txt` | copy deposited `00README` text onto the directory document |
//!
//! The three directory units run only when a `[dirs].index` is configured.
//! A unit whose marker exists is skipped, so a log is never applied twice.
//! Markers are written only once their unit has succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use archive_sync_core::bulk::BulkReport;
use archive_sync_core::index::SearchIndex;
use archive_sync_core::profile::dirname;
use archive_sync_core::reconcile::ResponseMode;
use archive_sync_core::updater::IndexUpdater;

use crate::checksums::calculate_checksums;
use crate::config::Config;
use crate::logs::{marker_stem, write_file_list, DepositLog};
use crate::outcome::RunReport;
use crate::progress::{ProgressReporter, UnitProgress};

#[derive(Debug, Clone, Default)]
pub struct DepositOptions {
    /// Log file name inside `[logs].deposit_dir`; defaults to the newest
    /// complete log.
    pub log: Option<String>,
    /// Hash deposited files and update their indexed checksums.
    pub calculate: bool,
    /// Write marker lists after each unit.
    pub create_files: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Deposits,
    Removals,
    Mkdirs,
    Rmdirs,
    Readmes,
}

impl Kind {
    fn marker_suffix(self) -> &'static str {
        match self {
            Kind::Deposits => "DEPOSIT",
            Kind::Removals => "REMOVE",
            Kind::Mkdirs => "MKDIR",
            Kind::Rmdirs => "RMDIR",
            Kind::Readmes => "README",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Kind::Deposits => "deposits",
            Kind::Removals => "removals",
            Kind::Mkdirs => "new directories",
            Kind::Rmdirs => "removed directories",
            Kind::Readmes => "readmes",
        }
    }
}

struct Unit {
    kind: Kind,
    name: String,
    marker: PathBuf,
}

impl Unit {
    fn new(kind: Kind, log_name: &str, output_dir: &Path) -> Self {
        Unit {
            kind,
            name: format!("{} {}", log_name, kind.label()),
            marker: output_dir.join(format!("{}_{}.txt", marker_stem(log_name), kind.marker_suffix())),
        }
    }

    fn done(&self) -> bool {
        self.marker.exists()
    }
}

pub async fn run_deposit(
    config: &Config,
    index: &dyn SearchIndex,
    dirs: Option<&dyn SearchIndex>,
    reporter: &dyn ProgressReporter,
    options: &DepositOptions,
) -> Result<RunReport> {
    let name = match &options.log {
        Some(name) => name.clone(),
        None => DepositLog::default_name(&config.logs.deposit_dir, &config.logs.deposit_prefix)?,
    };

    let mut kinds = vec![Kind::Deposits, Kind::Removals];
    if dirs.is_some() {
        kinds.extend([Kind::Mkdirs, Kind::Rmdirs, Kind::Readmes]);
    } else {
        info!("no [dirs].index configured; directory changes are not applied");
    }
    let units: Vec<Unit> = kinds
        .into_iter()
        .map(|kind| Unit::new(kind, &name, &config.output.dir))
        .collect();

    let mut report = RunReport::new(config.batch.continue_on_error);

    // All done: nothing to read.
    if units.iter().all(Unit::done) {
        for unit in &units {
            report.skipped(&unit.name, "already processed");
        }
        return Ok(report);
    }

    info!(log = %name, "scanning deposit log");
    let log = DepositLog::load(&config.logs.deposit_dir.join(&name))?;
    if options.create_files {
        fs::create_dir_all(&config.output.dir)?;
    }

    for unit in &units {
        match unit.kind {
            Kind::Deposits => {
                if unit.done() {
                    report.skipped(&unit.name, "already processed");
                    continue;
                }
                let result = process_deposits(config, index, reporter, &log, options.calculate).await;
                let result = result.and_then(|summary| {
                    mark(unit, &log.deposits, options.create_files)?;
                    Ok(summary)
                });
                report.record(&unit.name, result, |summary| summary.clone())?;
            }
            Kind::Removals => {
                if !pending(&mut report, unit, &log.removals, options.create_files)? {
                    continue;
                }
                let progress = UnitProgress::start(reporter, unit.name.clone(), log.removals.len());
                let updater = IndexUpdater::new(index, config.batch.blocksize)?.with_progress(&progress);
                let result = updater.delete_files(&log.removals).await;
                record_bulk(&mut report, unit, &log.removals, options.create_files, result, "deleted")?;
            }
            Kind::Mkdirs | Kind::Rmdirs => {
                let Some(dirs) = dirs else { continue };
                let paths = if unit.kind == Kind::Mkdirs { &log.mkdirs } else { &log.rmdirs };
                if !pending(&mut report, unit, paths, options.create_files)? {
                    continue;
                }
                let progress = UnitProgress::start(reporter, unit.name.clone(), paths.len());
                let updater = IndexUpdater::new(dirs, config.batch.blocksize)?.with_progress(&progress);
                let (result, verb) = if unit.kind == Kind::Mkdirs {
                    (updater.add_dirs(paths).await, "indexed")
                } else {
                    (updater.delete_files(paths).await, "deleted")
                };
                record_bulk(&mut report, unit, paths, options.create_files, result, verb)?;
            }
            Kind::Readmes => {
                let Some(dirs) = dirs else { continue };
                if !pending(&mut report, unit, &log.readmes, options.create_files)? {
                    continue;
                }
                let readmes = read_readmes(&log.readmes);
                let progress = UnitProgress::start(reporter, unit.name.clone(), readmes.len());
                let updater = IndexUpdater::new(dirs, config.batch.blocksize)?.with_progress(&progress);
                let result = updater.update_readmes(&readmes).await;
                record_bulk(&mut report, unit, &log.readmes, options.create_files, result, "updated")?;
            }
        }
    }

    Ok(report)
}

/// Whether `unit` still has work. Finished and empty units are recorded as
/// skipped; an empty unit still gets its (empty) marker.
fn pending(report: &mut RunReport, unit: &Unit, items: &[String], create_files: bool) -> Result<bool> {
    if unit.done() {
        report.skipped(&unit.name, "already processed");
        return Ok(false);
    }
    if items.is_empty() {
        mark(unit, items, create_files)?;
        report.skipped(&unit.name, format!("no {} in log", unit.kind.label()));
        return Ok(false);
    }
    Ok(true)
}

fn mark(unit: &Unit, items: &[String], create_files: bool) -> Result<()> {
    if create_files {
        write_file_list(&unit.marker, items)?;
    }
    Ok(())
}

fn record_bulk(
    report: &mut RunReport,
    unit: &Unit,
    items: &[String],
    create_files: bool,
    result: Result<BulkReport>,
    verb: &str,
) -> Result<()> {
    let result = result.and_then(|bulk| {
        mark(unit, items, create_files)?;
        Ok(bulk)
    });
    report.record(&unit.name, result, |bulk| {
        format!(
            "{} {} in log; {} {}, failed {}",
            items.len(),
            unit.kind.label(),
            verb,
            bulk.docs_changed(),
            bulk.failed
        )
    })?;
    Ok(())
}

/// Readme text keyed by the directory holding it. Unreadable files are
/// skipped with a warning.
fn read_readmes(paths: &[String]) -> BTreeMap<String, String> {
    let mut readmes = BTreeMap::new();
    for path in paths {
        match fs::read_to_string(path) {
            Ok(content) => {
                readmes.insert(dirname(path), content);
            }
            Err(e) => warn!(path = %path, "could not read readme: {}", e),
        }
    }
    readmes
}

async fn process_deposits(
    config: &Config,
    index: &dyn SearchIndex,
    reporter: &dyn ProgressReporter,
    log: &DepositLog,
    calculate: bool,
) -> Result<String> {
    if log.deposits.is_empty() {
        return Ok("no files to add".to_string());
    }

    let profile = config.profile()?;
    let progress = UnitProgress::start(reporter, format!("{} deposits", log.name), log.deposits.len());
    let updater = IndexUpdater::new(index, config.batch.blocksize)?.with_progress(&progress);

    if calculate {
        let checksums = calculate_checksums(&log.deposits);
        let result = updater.update_checksums(&checksums, &profile).await?;
        return Ok(format!(
            "{} deposits; {} not yet indexed; {}",
            log.deposits.len(),
            result.missing.len(),
            result.summary
        ));
    }

    let found = updater
        .check_files_existence(&profile.query, &log.deposits, ResponseMode::Filtered)
        .await?;
    Ok(format!(
        "{} deposits ({} 00README); {} indexed, {} not yet indexed",
        log.deposits.len(),
        log.readmes.len(),
        found.present.len() + found.ambiguous.len(),
        found.absent.len()
    ))
}
