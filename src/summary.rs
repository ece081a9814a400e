//! `esync report`: tabulate the result files written by `esync check`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::warn;
use walkdir::WalkDir;

use crate::check::CHECK_LOG_SUFFIX;

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub list: String,
    pub total: u64,
    pub indexed: u64,
    pub missing: u64,
    pub percent_missing: f64,
}

/// Read the summary line of every `*_log.txt` in `dir`, sorted by name.
///
/// Files whose first line is not a check summary are skipped.
pub fn read_check_logs(dir: &Path) -> Result<Vec<SummaryRow>> {
    let summary = Regex::new(
        r"Total Files in Spot: (\d+) Total Indexed: (\d+) Total Missing: (\d+) Percentage Missing: ([\d.]+)%",
    )?;

    let mut paths: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.file_name()
                .map_or(false, |n| n.to_string_lossy().ends_with(CHECK_LOG_SUFFIX))
        })
        .collect();
    paths.sort();

    let mut rows = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let first = content.lines().next().unwrap_or_default();
        let Some(caps) = summary.captures(first) else {
            warn!(path = %path.display(), "no summary line, skipping");
            continue;
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let list = name.strip_suffix(CHECK_LOG_SUFFIX).unwrap_or(&name).to_string();
        match parse_row(list, &caps) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(path = %path.display(), "unreadable summary line, skipping: {}", e),
        }
    }
    Ok(rows)
}

fn parse_row(list: String, caps: &Captures<'_>) -> Result<SummaryRow> {
    Ok(SummaryRow {
        list,
        total: caps[1].parse()?,
        indexed: caps[2].parse()?,
        missing: caps[3].parse()?,
        percent_missing: caps[4].parse()?,
    })
}

pub fn render_table(rows: &[SummaryRow]) -> String {
    let width = rows
        .iter()
        .map(|r| r.list.len())
        .chain(std::iter::once("List".len()))
        .max()
        .unwrap_or(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>12}  {:>10}  {:>10}  {:>9}",
        "List", "Files", "Indexed", "Missing", "Missing %"
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 51));
    for r in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>12}  {:>10}  {:>10}  {:>8.2}%",
            r.list, r.total, r.indexed, r.missing, r.percent_missing
        );
    }
    let _ = write!(
        out,
        "Total Files: {} Total Indexed: {} Total Missing: {}",
        rows.iter().map(|r| r.total).sum::<u64>(),
        rows.iter().map(|r| r.indexed).sum::<u64>(),
        rows.iter().map(|r| r.missing).sum::<u64>()
    );
    out
}

pub fn run_report(dir: &Path) -> Result<()> {
    let rows = read_check_logs(dir)?;
    if rows.is_empty() {
        println!("No check results in {}", dir.display());
        return Ok(());
    }
    println!("{}", render_table(&rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_and_totals_check_logs() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("spot-b_log.txt"),
            "Summary: Total Files in Spot: 4 Total Indexed: 4 Total Missing: 0 Percentage Missing: 0.00%\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("spot-a_log.txt"),
            "Summary: Total Files in Spot: 3 Total Indexed: 2 Total Missing: 1 Percentage Missing: 33.33%\n/a/y.nc\n",
        )
        .unwrap();
        fs::write(tmp.path().join("notes_log.txt"), "hello\n").unwrap();
        fs::write(
            tmp.path().join("garbled_log.txt"),
            "Summary: Total Files in Spot: 3 Total Indexed: 2 Total Missing: 1 Percentage Missing: 1.2.3%\n",
        )
        .unwrap();
        fs::write(tmp.path().join("other.txt"), "Summary: ...\n").unwrap();

        let rows = read_check_logs(tmp.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].list, "spot-a");
        assert_eq!(rows[0].missing, 1);
        assert!((rows[0].percent_missing - 33.33).abs() < 1e-9);

        let table = render_table(&rows);
        assert!(table.contains("spot-b"));
        assert!(table.ends_with("Total Files: 7 Total Indexed: 6 Total Missing: 1"));
    }
}
