//! Per-index query templates and document layouts.
//!
//! An [`IndexProfile`] bundles the existence query used for a family of
//! indices with the field paths the updater writes to. Document ids for
//! file documents are the lowercase hex SHA-1 of the path string, which is
//! how the archive's indexers key them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::bail;
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};

use crate::template::{Params, QueryTemplate};

/// Stable document id for a file path.
pub fn doc_id(path: &str) -> String {
    hex::encode(Sha1::digest(path.as_bytes()))
}

/// Where a file's bytes currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    OnDisk,
    OnTape,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::OnDisk => "on_disk",
            Location::OnTape => "on_tape",
        }
    }

    pub fn from_on_disk(on_disk: bool) -> Self {
        if on_disk {
            Location::OnDisk
        } else {
            Location::OnTape
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existence query: template plus the function producing its parameters.
#[derive(Clone)]
pub struct SearchQuery {
    pub template: QueryTemplate,
    pub params: fn(&str) -> Params,
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("template", &self.template.as_str())
            .finish()
    }
}

/// Query and field layout for one family of indices.
#[derive(Debug, Clone)]
pub struct IndexProfile {
    pub name: &'static str,
    pub query: SearchQuery,
    /// Dotted path of the location field, e.g. `info.location`.
    pub location_field: &'static str,
    /// Dotted path of the checksum field, if the documents carry one.
    pub checksum_field: Option<&'static str>,
}

impl IndexProfile {
    /// File index keyed by path hash; term query on `_id`.
    pub fn fbi() -> Self {
        Self {
            name: "fbi",
            query: SearchQuery {
                template: QueryTemplate::new(r#"{"query":{"term":{"_id":"<id>"}}}"#),
                params: |item| Params::from([("id".to_string(), doc_id(item))]),
            },
            location_field: "info.location",
            checksum_field: Some("info.md5"),
        }
    }

    /// File index looked up by directory and file name, for documents
    /// indexed before ids were path hashes.
    pub fn fbi_by_name() -> Self {
        Self {
            name: "fbi-by-name",
            query: SearchQuery {
                template: QueryTemplate::new(
                    r#"{"query":{"bool":{"must":{"match":{"info.directory":"<dirname>"}},"filter":{"term":{"info.name":"<filename>"}}}}}"#,
                ),
                params: |item| {
                    Params::from([
                        ("dirname".to_string(), dirname(item)),
                        ("filename".to_string(), basename(item)),
                    ])
                },
            },
            location_field: "info.location",
            checksum_field: Some("info.md5"),
        }
    }

    /// EO index searched by manifest path.
    pub fn eo_manifest() -> Self {
        Self {
            name: "eo-manifest",
            query: SearchQuery {
                template: QueryTemplate::new(
                    r#"{"_source":{"includes":["file"]},"query":{"bool":{"must":{"match":{"file.path.raw":"<full_path>"}}}}}"#,
                ),
                params: |item| Params::from([("full_path".to_string(), item.to_string())]),
            },
            location_field: "file.location",
            checksum_field: None,
        }
    }

    /// EO index searched by data file name within a directory.
    pub fn eo_data_file() -> Self {
        Self {
            name: "eo-data-file",
            query: SearchQuery {
                template: QueryTemplate::new(
                    r#"{"query":{"bool":{"must":{"match":{"file.directory":"<dirname>"}},"filter":{"term":{"file.data_file.keyword":"<filename>"}}}}}"#,
                ),
                params: |item| {
                    Params::from([
                        ("dirname".to_string(), dirname(item)),
                        ("filename".to_string(), basename(item)),
                    ])
                },
            },
            location_field: "file.location",
            checksum_field: None,
        }
    }
}

impl FromStr for IndexProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fbi" => IndexProfile::fbi(),
            "fbi-by-name" => IndexProfile::fbi_by_name(),
            "eo-manifest" => IndexProfile::eo_manifest(),
            "eo-data-file" => IndexProfile::eo_data_file(),
            other => bail!(
                "Unknown index profile: '{}'. Must be fbi, fbi-by-name, eo-manifest, or eo-data-file.",
                other
            ),
        })
    }
}

pub fn dirname(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Directory index document for an archive directory.
pub fn dir_doc(path: &str) -> Value {
    json!({
        "path": path,
        "archive_path": path,
        "dir": basename(path),
        "depth": path.split('/').filter(|c| !c.is_empty()).count(),
        "type": "dir",
    })
}

/// Read a dotted field path out of a document source.
pub fn get_field<'a>(source: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(source, |value, key| value.get(key))
}

/// Build the nested partial document `{"a": {"b": value}}` for `a.b`.
pub fn nested_doc(dotted: &str, value: Value) -> Value {
    dotted.rsplit('.').fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.to_string(), inner);
        Value::Object(map)
    })
}
