//! `esync download`: dump every document of the index to disk.
//!
//! Pages through the index sorted by `_id` with `search_after` and writes
//! each hit as `<output>/<_id>` (the full hit as JSON). With `mapping`, the
//! index mapping is saved to `<output>/mapping.json` first.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::debug;

use archive_sync_core::index::SearchIndex;

pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// File the index mapping is saved to.
pub const MAPPING_FILE: &str = "mapping.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub records: usize,
    pub files: usize,
    pub pages: usize,
}

pub async fn save_mapping(index: &dyn SearchIndex, output: &Path) -> Result<PathBuf> {
    let mapping = index.mapping().await?;
    let path = output.join(MAPPING_FILE);
    fs::write(&path, serde_json::to_string_pretty(&mapping)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub async fn run_download(
    index: &dyn SearchIndex,
    output: &Path,
    size: usize,
    mapping: bool,
) -> Result<DownloadStats> {
    if size == 0 {
        bail!("page size must be > 0");
    }
    fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;

    if mapping {
        let path = save_mapping(index, output).await?;
        println!("Mapping saved to {}", path.display());
    }

    let mut stats = DownloadStats::default();
    let mut search_after: Option<Value> = None;

    loop {
        let mut query = json!({
            "sort": [{"_id": "asc"}],
            "size": size,
        });
        if let Some(after) = &search_after {
            query["search_after"] = after.clone();
        }

        let result = index.search(&query).await?;
        let hits = result
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .context("search response has no hits.hits")?;
        if hits.is_empty() {
            break;
        }
        stats.pages += 1;
        debug!(page = stats.pages, hits = hits.len(), "downloaded page");

        for hit in hits {
            stats.records += 1;
            let id = hit
                .get("_id")
                .and_then(Value::as_str)
                .context("hit has no _id")?;
            if id.is_empty() || id.contains('/') || id == "." || id == ".." || (mapping && id == MAPPING_FILE) {
                bail!("document id '{}' cannot be used as a file name", id);
            }
            let path = output.join(id);
            let body = serde_json::to_string(hit)?;
            fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
            stats.files += 1;
        }

        let last = &hits[hits.len() - 1];
        search_after = Some(match last.get("sort") {
            Some(sort) => sort.clone(),
            None => json!([last["_id"]]),
        });
    }

    println!(
        "Total Records: {} Total Files created: {} Pages: {}",
        stats.records, stats.files, stats.pages
    );
    Ok(stats)
}
