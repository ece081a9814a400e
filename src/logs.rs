//! Readers for the archive's log files and plain file lists.
//!
//! - File lists: one path per line, blank lines ignored.
//! - Checksum logs: `path|type|checksum|size|timestamp`, `#` comments.
//! - Deposit logs: `YYYY-MM-DD HH:MM:SS:path:ACTION:size:message`.
//!
//! Log directories hold several streams (`<stream>.<date>`); [`latest_logs`]
//! picks one log per stream by rank.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::{debug, warn};

/// Read a file list, skipping blank lines.
pub fn read_file_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file list: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write one path per line.
pub fn write_file_list<S: AsRef<str>>(path: &Path, items: &[S]) -> Result<()> {
    let mut content = String::new();
    for item in items {
        content.push_str(item.as_ref());
        content.push('\n');
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Pick one log per stream from `dir`.
///
/// Logs whose names start with `prefix` are grouped by stream (the name up
/// to the first `.`) and sorted by name, oldest first. `rank` 1 is the
/// oldest log, -1 the newest, -2 the one before it. Out-of-range ranks are
/// clamped to the oldest/newest log. Results are sorted by stream name.
pub fn latest_logs(dir: &Path, prefix: &str, rank: isize) -> Result<Vec<String>> {
    if rank == 0 {
        bail!("log rank must be non-zero");
    }

    let mut streams: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    let names: BTreeSet<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    for name in names.iter().filter(|n| n.starts_with(prefix)) {
        let stream = name.split('.').next().unwrap_or(name).to_string();
        streams.entry(stream).or_default();
    }
    for (stream, logs) in streams.iter_mut() {
        // A stream's logs are every entry sharing its leading name.
        logs.extend(
            names
                .iter()
                .filter(|n| n.split('.').next() == Some(stream.as_str()))
                .cloned(),
        );
    }

    Ok(streams
        .into_values()
        .filter_map(|logs| pick(&logs, rank).cloned())
        .collect())
}

fn pick(sorted: &[String], rank: isize) -> Option<&String> {
    let len = sorted.len() as isize;
    if len == 0 {
        return None;
    }
    let rank = rank.clamp(-len, len);
    let index = if rank > 0 { rank - 1 } else { len + rank };
    sorted.get(index as usize)
}

/// Checksums from one checksum log, keyed by full path.
#[derive(Debug, Clone, Default)]
pub struct ChecksumLog {
    source: Option<PathBuf>,
    checksums: BTreeMap<String, String>,
}

impl ChecksumLog {
    /// Parse `path`, joining each logged relative path onto `base_dir`.
    pub fn load(path: &Path, base_dir: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checksum log: {}", path.display()))?;
        let mut log = Self::parse(&content, base_dir);
        log.source = Some(path.to_path_buf());
        debug!(log = %path.display(), entries = log.len(), "checksum log loaded");
        Ok(log)
    }

    /// Load the newest `checksum_prefix` log for `spot` under `log_dir`.
    ///
    /// A spot with no log directory or no logs gives an empty table.
    pub fn latest(log_dir: &Path, spot: &str, prefix: &str, base_dir: &str) -> Result<Self> {
        let spot_dir = log_dir.join(spot);
        if !spot_dir.is_dir() {
            warn!(dir = %spot_dir.display(), "no checksum logs for spot");
            return Ok(Self::default());
        }
        match latest_logs(&spot_dir, prefix, -1)?.first() {
            Some(name) => Self::load(&spot_dir.join(name), base_dir),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str, base_dir: &str) -> Self {
        let mut checksums = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() < 3 {
                warn!(line = line, "skipping unreadable checksum line");
                continue;
            }
            checksums.insert(join_path(base_dir, fields[0]), fields[2].to_string());
        }
        Self {
            source: None,
            checksums,
        }
    }

    /// Checksum for `path`, or an empty string when the log has none.
    pub fn get(&self, path: &str) -> &str {
        self.checksums.get(path).map(String::as_str).unwrap_or("")
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.checksums
    }
}

fn join_path(base: &str, relative: &str) -> String {
    if base.is_empty() {
        return relative.to_string();
    }
    Path::new(base).join(relative).to_string_lossy().to_string()
}

/// Prefix for the marker lists written for a deposit log. Only a trailing
/// `.log` is dropped; the date part of the name keeps stems unique.
pub fn marker_stem(log_name: &str) -> &str {
    log_name.strip_suffix(".log").unwrap_or(log_name)
}

/// Archive operations recorded in one deposit log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositLog {
    pub name: String,
    pub deposits: Vec<String>,
    pub removals: Vec<String>,
    pub mkdirs: Vec<String>,
    pub rmdirs: Vec<String>,
    /// Deposited `00README` files, also listed in `deposits`.
    pub readmes: Vec<String>,
}

impl DepositLog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read deposit log: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::parse(&name, &content)
    }

    /// The newest complete log in `dir`: the penultimate by name.
    pub fn default_name(dir: &Path, prefix: &str) -> Result<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(prefix))
            .collect();
        names.sort();
        if names.len() < 2 {
            bail!(
                "Need at least two '{}' logs in {} to pick a complete one",
                prefix,
                dir.display()
            );
        }
        Ok(names.swap_remove(names.len() - 2))
    }

    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let action = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}:(.+?):(DEPOSIT|REMOVE|MKDIR|RMDIR|SYMLINK):")?;

        let mut log = DepositLog {
            name: name.to_string(),
            ..Default::default()
        };

        for line in content.lines() {
            let Some(caps) = action.captures(line) else {
                if !line.trim().is_empty() {
                    debug!(line = line, "skipping deposit log line");
                }
                continue;
            };
            let path = caps[1].to_string();
            match &caps[2] {
                "DEPOSIT" => {
                    if path.ends_with("/00README") || path == "00README" {
                        log.readmes.push(path.clone());
                    }
                    log.deposits.push(path);
                }
                "REMOVE" => log.removals.push(path),
                "MKDIR" => log.mkdirs.push(path),
                "RMDIR" => log.rmdirs.push(path),
                _ => debug!(path = %path, "ignoring symlink"),
            }
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_list_skips_blank_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("list.txt");
        fs::write(&path, "/a/x.nc\n\n  \n/a/y.nc\n").unwrap();
        assert_eq!(read_file_list(&path).unwrap(), vec!["/a/x.nc", "/a/y.nc"]);

        let out = tmp.path().join("out.txt");
        write_file_list(&out, &["/b/1", "/b/2"]).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "/b/1\n/b/2\n");
    }

    #[test]
    fn checksum_log_joins_base_dir() {
        let log = ChecksumLog::parse(
            "# header\nmetadata/csml/f.xml|md5|69b829decea5563e33b0856ec80a0c83|806321|2010-04-29T11:10:13Z\nbroken line\n",
            "/badc/seviri",
        );
        assert_eq!(log.len(), 1);
        assert_eq!(
            log.get("/badc/seviri/metadata/csml/f.xml"),
            "69b829decea5563e33b0856ec80a0c83"
        );
        assert_eq!(log.get("/badc/seviri/other"), "");
    }

    #[test]
    fn deposit_log_sorts_actions() {
        let content = "\
2017-08-20 03:05:03:/badc/msg/data/a.png:DEPOSIT:1388172: (force=None) /datacentre/arrivals/a.png
2017-08-20 03:05:04:/badc/msg/data/00README:DEPOSIT:12:
2017-08-20 03:05:05:/badc/msg/data/old.png:REMOVE:0:
2017-08-20 03:05:06:/badc/msg/data/2017:MKDIR:0:
2017-08-20 03:05:07:/badc/msg/data/2016:RMDIR:0:
2017-08-20 03:05:08:/badc/msg/latest:SYMLINK:0:
garbage
";
        let log = DepositLog::parse("deposit_ingest1.2017-08-20", content).unwrap();
        assert_eq!(log.deposits, vec!["/badc/msg/data/a.png", "/badc/msg/data/00README"]);
        assert_eq!(log.readmes, vec!["/badc/msg/data/00README"]);
        assert_eq!(log.removals, vec!["/badc/msg/data/old.png"]);
        assert_eq!(log.mkdirs, vec!["/badc/msg/data/2017"]);
        assert_eq!(log.rmdirs, vec!["/badc/msg/data/2016"]);
        assert!(!log.deposits.iter().any(|p| p == "/badc/msg/latest"));
        assert_eq!(marker_stem(&log.name), "deposit_ingest1.2017-08-20");
        assert_eq!(marker_stem("deposit_ingest1.2017-08-20.log"), "deposit_ingest1.2017-08-20");
    }

    #[test]
    fn default_deposit_log_is_the_penultimate() {
        let tmp = TempDir::new().unwrap();
        for name in ["deposit_ingest1.2017-08-19", "deposit_ingest1.2017-08-21", "deposit_ingest1.2017-08-20", "other.log"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        assert_eq!(
            DepositLog::default_name(tmp.path(), "deposit_ingest1.").unwrap(),
            "deposit_ingest1.2017-08-20"
        );
    }

    #[test]
    fn latest_logs_per_stream_with_clamped_rank() {
        let tmp = TempDir::new().unwrap();
        for name in ["checkm.2017-01", "checkm.2017-02", "checkm.2017-03", "notes.txt"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        assert_eq!(latest_logs(tmp.path(), "checkm.", -1).unwrap(), vec!["checkm.2017-03"]);
        assert_eq!(latest_logs(tmp.path(), "checkm.", -2).unwrap(), vec!["checkm.2017-02"]);
        assert_eq!(latest_logs(tmp.path(), "checkm.", 1).unwrap(), vec!["checkm.2017-01"]);
        assert_eq!(latest_logs(tmp.path(), "checkm.", -10).unwrap(), vec!["checkm.2017-01"]);
        assert_eq!(latest_logs(tmp.path(), "checkm.", 10).unwrap(), vec!["checkm.2017-03"]);
        assert!(latest_logs(tmp.path(), "nothing.", -1).unwrap().is_empty());
    }

    #[test]
    fn latest_checksum_log_for_spot() {
        let tmp = TempDir::new().unwrap();
        let spot = tmp.path().join("spot-1");
        fs::create_dir(&spot).unwrap();
        fs::write(spot.join("checkm.2017-01"), "a.nc|md5|old|1|t\n").unwrap();
        fs::write(spot.join("checkm.2017-02"), "a.nc|md5|new|1|t\n").unwrap();

        let log = ChecksumLog::latest(tmp.path(), "spot-1", "checkm.", "/badc/x").unwrap();
        assert_eq!(log.get("/badc/x/a.nc"), "new");
        assert!(ChecksumLog::latest(tmp.path(), "spot-2", "checkm.", "/badc/x").unwrap().is_empty());
    }
}
