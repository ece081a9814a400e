//! Chunked `_msearch` and `_bulk` request bodies.
//!
//! Both builders emit newline-delimited JSON: one header line followed by
//! a body line per sub-request (delete actions have no body line). Every
//! `blocksize`-th item closes the current body and starts a new one; a
//! non-empty remainder becomes a final, smaller body.
//!
//! ```rust
//! use archive_sync_core::batch::BatchBuilder;
//! use archive_sync_core::template::{Params, QueryTemplate};
//!
//! let builder = BatchBuilder::new(2).unwrap();
//! let tmpl = QueryTemplate::new(r#"{"query":{"term":{"_id":"<id>"}}}"#);
//! let items = ["/a/x.nc", "/a/y.nc", "/b/z.nc"];
//! let batches = builder
//!     .search_batches(&tmpl, |p: &str| Params::from([("id".into(), p.into())]), &items)
//!     .unwrap();
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[0].len(), 2);
//! assert_eq!(batches[1].len(), 1);
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::{BatchError, BatchResult};
use crate::template::{Params, QueryTemplate};

/// Default number of sub-requests per network call.
pub const DEFAULT_BLOCKSIZE: usize = 800;

/// One request body ready to send, plus its sub-request count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    body: String,
    len: usize,
}

impl Batch {
    /// The NDJSON payload.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Number of sub-requests in this body.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bulk API action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Index,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(BulkAction::Index),
            "update" => Ok(BulkAction::Update),
            "delete" => Ok(BulkAction::Delete),
            other => Err(BatchError::InvalidAction(other.to_string())),
        }
    }
}

/// A single document operation for the bulk builder.
///
/// `document` is the full source for `index`, the partial document for
/// `update` (wrapped as `{"doc": ...}`), and ignored for `delete`.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub id: String,
    pub document: Value,
}

impl BulkOperation {
    pub fn new(id: impl Into<String>, document: Value) -> Self {
        Self {
            id: id.into(),
            document,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }
}

/// Splits items into request bodies of at most `blocksize` sub-requests.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    blocksize: usize,
    target_index: Option<String>,
}

impl BatchBuilder {
    pub fn new(blocksize: usize) -> BatchResult<Self> {
        if blocksize == 0 {
            return Err(BatchError::InvalidBlocksize);
        }
        Ok(Self {
            blocksize,
            target_index: None,
        })
    }

    /// Name the index in every header instead of relying on the URL's
    /// default target.
    pub fn with_target_index(mut self, index: impl Into<String>) -> Self {
        self.target_index = Some(index.into());
        self
    }

    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    /// Build `_msearch` bodies: a routing header and a rendered query per item.
    pub fn search_batches<S, F>(
        &self,
        template: &QueryTemplate,
        param_fn: F,
        items: &[S],
    ) -> BatchResult<Vec<Batch>>
    where
        S: AsRef<str>,
        F: Fn(&str) -> Params,
    {
        let header = match &self.target_index {
            Some(index) => json!({ "index": index }).to_string(),
            None => "{}".to_string(),
        };

        let mut chunker = Chunker::new(self.blocksize);
        for item in items {
            let query = template.render(&param_fn(item.as_ref()))?;
            let mut lines = String::with_capacity(header.len() + query.len() + 2);
            lines.push_str(&header);
            lines.push('\n');
            lines.push_str(&query);
            lines.push('\n');
            chunker.push(&lines);
        }
        Ok(chunker.finish())
    }

    /// Build `_bulk` bodies for `action` over `operations`.
    pub fn bulk_batches(
        &self,
        action: BulkAction,
        operations: &[BulkOperation],
    ) -> BatchResult<Vec<Batch>> {
        let mut chunker = Chunker::new(self.blocksize);
        for op in operations {
            let mut meta = serde_json::Map::new();
            if let Some(index) = &self.target_index {
                meta.insert("_index".into(), Value::String(index.clone()));
            }
            meta.insert("_id".into(), Value::String(op.id.clone()));
            let mut header = serde_json::Map::new();
            header.insert(action.as_str().to_string(), Value::Object(meta));

            let mut lines = Value::Object(header).to_string();
            lines.push('\n');
            match action {
                BulkAction::Index => {
                    lines.push_str(&op.document.to_string());
                    lines.push('\n');
                }
                BulkAction::Update => {
                    lines.push_str(&json!({ "doc": op.document }).to_string());
                    lines.push('\n');
                }
                BulkAction::Delete => {}
            }
            chunker.push(&lines);
        }
        Ok(chunker.finish())
    }

    /// Like [`bulk_batches`](Self::bulk_batches) with the action given by name.
    pub fn bulk_batches_named(
        &self,
        action: &str,
        operations: &[BulkOperation],
    ) -> BatchResult<Vec<Batch>> {
        self.bulk_batches(action.parse()?, operations)
    }
}

struct Chunker {
    blocksize: usize,
    current: String,
    count: usize,
    done: Vec<Batch>,
}

impl Chunker {
    fn new(blocksize: usize) -> Self {
        Self {
            blocksize,
            current: String::new(),
            count: 0,
            done: Vec::new(),
        }
    }

    fn push(&mut self, lines: &str) {
        self.current.push_str(lines);
        self.count += 1;
        if self.count == self.blocksize {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.count > 0 {
            self.done.push(Batch {
                body: std::mem::take(&mut self.current),
                len: self.count,
            });
            self.count = 0;
        }
    }

    fn finish(mut self) -> Vec<Batch> {
        self.flush();
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_params(item: &str) -> Params {
        Params::from([("id".to_string(), item.to_string())])
    }

    fn id_template() -> QueryTemplate {
        QueryTemplate::new(r#"{"query":{"term":{"_id":"<id>"}}}"#)
    }

    #[test]
    fn batch_count_is_ceiling_of_items_over_blocksize() {
        let items: Vec<String> = (0..23).map(|i| format!("/f/{i}")).collect();
        for blocksize in [1, 2, 5, 22, 23, 24, 800] {
            let builder = BatchBuilder::new(blocksize).unwrap();
            let batches = builder
                .search_batches(&id_template(), id_params, &items)
                .unwrap();
            assert_eq!(batches.len(), items.len().div_ceil(blocksize));
            assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), items.len());
            assert!(batches.iter().all(|b| b.len() <= blocksize));
            for b in &batches {
                assert_eq!(b.body().lines().count(), b.len() * 2);
            }
        }
    }

    #[test]
    fn search_batches_have_empty_routing_header() {
        let builder = BatchBuilder::new(800).unwrap();
        let batches = builder
            .search_batches(&id_template(), id_params, &["/a/x.nc"])
            .unwrap();
        assert_eq!(
            batches[0].body(),
            "{}\n{\"query\":{\"term\":{\"_id\":\"/a/x.nc\"}}}\n"
        );
    }

    #[test]
    fn target_index_goes_into_headers() {
        let builder = BatchBuilder::new(800).unwrap().with_target_index("ceda-fbi");
        let batches = builder
            .search_batches(&id_template(), id_params, &["x"])
            .unwrap();
        assert!(batches[0].body().starts_with(r#"{"index":"ceda-fbi"}"#));
    }

    #[test]
    fn empty_input_gives_no_batches() {
        let builder = BatchBuilder::new(3).unwrap();
        let items: Vec<String> = Vec::new();
        assert!(builder
            .search_batches(&id_template(), id_params, &items)
            .unwrap()
            .is_empty());
        assert!(builder
            .bulk_batches(BulkAction::Delete, &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn zero_blocksize_is_rejected() {
        assert_eq!(
            BatchBuilder::new(0).unwrap_err(),
            BatchError::InvalidBlocksize
        );
    }

    #[test]
    fn missing_parameter_aborts_search_build() {
        let builder = BatchBuilder::new(10).unwrap();
        let err = builder
            .search_batches(&id_template(), |_| Params::new(), &["x"])
            .unwrap_err();
        assert_eq!(err, BatchError::MissingParameter("id".into()));
    }

    #[test]
    fn bulk_update_lines() {
        let builder = BatchBuilder::new(800).unwrap().with_target_index("idx");
        let ops = vec![BulkOperation::new(
            "abc",
            json!({"info": {"location": "on_disk"}}),
        )];
        let batches = builder.bulk_batches(BulkAction::Update, &ops).unwrap();
        let lines: Vec<Value> = batches[0]
            .body()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0], json!({"update": {"_index": "idx", "_id": "abc"}}));
        assert_eq!(lines[1], json!({"doc": {"info": {"location": "on_disk"}}}));
    }

    #[test]
    fn bulk_index_and_delete_lines() {
        let builder = BatchBuilder::new(2).unwrap();
        let ops = vec![
            BulkOperation::new("a", json!({"path": "/a"})),
            BulkOperation::new("b", json!({"path": "/b"})),
            BulkOperation::new("c", json!({"path": "/c"})),
        ];
        let index = builder.bulk_batches(BulkAction::Index, &ops).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].body().lines().nth(1), Some(r#"{"path":"/a"}"#));

        let deletes = builder.bulk_batches(BulkAction::Delete, &ops).unwrap();
        assert_eq!(deletes[0].body(), "{\"delete\":{\"_id\":\"a\"}}\n{\"delete\":{\"_id\":\"b\"}}\n");
        assert_eq!(deletes[1].len(), 1);
    }

    #[test]
    fn unknown_action_name_is_invalid() {
        let builder = BatchBuilder::new(10).unwrap();
        let err = builder.bulk_batches_named("upsert", &[]).unwrap_err();
        assert_eq!(err, BatchError::InvalidAction("upsert".into()));
        assert_eq!("delete".parse::<BulkAction>().unwrap(), BulkAction::Delete);
    }
}
