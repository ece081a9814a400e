//! Per-index path filters.
//!
//! The filter file is JSON mapping an index alias to named groups, each
//! listing the archive roots whose files belong in that index:
//!
//! ```json
//! { "ceda-eo": { "sentinel": { "files": ["/neodc/sentinel1a"] } } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct FilterGroup {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    roots: HashMap<String, Vec<String>>,
}

impl IndexFilter {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read filter file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse filter file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: HashMap<String, BTreeMap<String, FilterGroup>> = serde_json::from_str(content)?;
        let roots = raw
            .into_iter()
            .map(|(alias, groups)| {
                let roots = groups.into_values().flat_map(|g| g.files).collect();
                (alias, roots)
            })
            .collect();
        Ok(Self { roots })
    }

    /// Keep the files that contain any of `alias`'s accepted roots.
    pub fn filter<S: AsRef<str>>(&self, files: &[S], alias: &str) -> Result<Vec<String>> {
        let roots = self
            .roots
            .get(alias)
            .with_context(|| format!("Index '{}' is not listed in the filter file", alias))?;

        let kept: Vec<String> = files
            .iter()
            .map(AsRef::as_ref)
            .filter(|file| roots.iter().any(|root| file.contains(root.as_str())))
            .map(str::to_string)
            .collect();

        debug!(alias = alias, input = files.len(), kept = kept.len(), "filtered file list");
        Ok(kept)
    }
}

/// Restrict `files` to the configured index using the `[filters]` file.
pub fn filter_for_index(config: &Config, files: Vec<String>) -> Result<Vec<String>> {
    let path = config
        .filters
        .path
        .as_deref()
        .context("Filtering needs [filters].path in the config file")?;
    let kept = IndexFilter::load(path)?.filter(&files, &config.index.name)?;
    info!(
        index = %config.index.name,
        dropped = files.len() - kept.len(),
        "applied index filter"
    );
    Ok(kept)
}
