//! In-memory [`SearchIndex`] for tests and dry runs.
//!
//! Documents live in a `BTreeMap` keyed by id behind `std::sync::RwLock`.
//! The query evaluator understands the subset the index profiles use:
//! `match_all`, `term`, `match` (exact equality), and `bool` with
//! `must` / `filter` / `must_not`. Updates that leave a document unchanged
//! report `noop`, as a real cluster does.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::SearchIndex;
use crate::profile::get_field;

const DEFAULT_SIZE: usize = 10;

pub struct InMemoryIndex {
    name: String,
    docs: RwLock<BTreeMap<String, Value>>,
    mappings: RwLock<Value>,
    msearch_bodies: RwLock<Vec<String>>,
    bulk_bodies: RwLock<Vec<String>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
            mappings: RwLock::new(json!({})),
            msearch_bodies: RwLock::new(Vec::new()),
            bulk_bodies: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, id: impl Into<String>, source: Value) {
        self.docs.write().unwrap().insert(id.into(), source);
    }

    /// Replace the `mappings` object returned by [`SearchIndex::mapping`].
    pub fn set_mappings(&self, mappings: Value) {
        *self.mappings.write().unwrap() = mappings;
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.docs.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `_msearch` body received, in order.
    pub fn msearch_bodies(&self) -> Vec<String> {
        self.msearch_bodies.read().unwrap().clone()
    }

    /// Every `_bulk` body received, in order.
    pub fn bulk_bodies(&self) -> Vec<String> {
        self.bulk_bodies.read().unwrap().clone()
    }

    fn run_query(&self, query: &Value, size: usize, after: Option<&str>) -> Value {
        let docs = self.docs.read().unwrap();
        let matched: Vec<(&String, &Value)> = docs
            .iter()
            .filter(|(id, _)| after.map_or(true, |a| id.as_str() > a))
            .filter(|(id, source)| matches(query, id, source))
            .collect();

        let hits: Vec<Value> = matched
            .iter()
            .take(size)
            .map(|(id, source)| {
                json!({
                    "_index": self.name,
                    "_id": id,
                    "_score": 1.0,
                    "_source": source,
                    "sort": [id],
                })
            })
            .collect();

        json!({
            "total": {"value": matched.len(), "relation": "eq"},
            "hits": hits,
        })
    }

    fn apply_bulk_line(
        index_name: &str,
        docs: &mut BTreeMap<String, Value>,
        action: &str,
        id: String,
        body: Option<Value>,
    ) -> Value {
        let (status, mut detail) = match action {
            "index" | "create" => {
                let source = body.unwrap_or(Value::Null);
                match docs.insert(id.clone(), source) {
                    Some(_) => (200, json!({"result": "updated"})),
                    None => (201, json!({"result": "created"})),
                }
            }
            "update" => match docs.get_mut(&id) {
                Some(existing) => {
                    let partial = body
                        .as_ref()
                        .and_then(|b| b.get("doc"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let before = existing.clone();
                    merge(existing, partial);
                    if *existing == before {
                        (200, json!({"result": "noop"}))
                    } else {
                        (200, json!({"result": "updated"}))
                    }
                }
                None => (
                    404,
                    json!({"error": {
                        "type": "document_missing_exception",
                        "reason": format!("[{}]: document missing", id),
                    }}),
                ),
            },
            "delete" => match docs.remove(&id) {
                Some(_) => (200, json!({"result": "deleted"})),
                None => (404, json!({"result": "not_found"})),
            },
            other => (
                400,
                json!({"error": {
                    "type": "illegal_argument_exception",
                    "reason": format!("unknown action [{}]", other),
                }}),
            ),
        };

        detail["_index"] = json!(index_name);
        detail["_id"] = json!(id);
        detail["status"] = json!(status);
        let mut item = Map::new();
        item.insert(action.to_string(), detail);
        Value::Object(item)
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn msearch(&self, body: &str) -> Result<Value> {
        self.msearch_bodies.write().unwrap().push(body.to_string());

        let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() % 2 != 0 {
            bail!("msearch body must contain header/query line pairs");
        }

        let mut responses = Vec::with_capacity(lines.len() / 2);
        for pair in lines.chunks(2) {
            let request: Value = serde_json::from_str(pair[1])
                .with_context(|| format!("invalid msearch query line: {}", pair[1]))?;
            let query = request.get("query").cloned().unwrap_or(json!({"match_all": {}}));
            let size = request
                .get("size")
                .and_then(Value::as_u64)
                .map(|s| s as usize)
                .unwrap_or(DEFAULT_SIZE);
            responses.push(json!({
                "took": 0,
                "status": 200,
                "hits": self.run_query(&query, size, None),
            }));
        }

        Ok(json!({ "took": 1, "responses": responses }))
    }

    async fn bulk(&self, body: &str) -> Result<Value> {
        self.bulk_bodies.write().unwrap().push(body.to_string());

        let mut lines = body.lines().filter(|l| !l.trim().is_empty());
        let mut items = Vec::new();
        let mut docs = self.docs.write().unwrap();

        while let Some(header_line) = lines.next() {
            let header: Value = serde_json::from_str(header_line)
                .with_context(|| format!("invalid bulk header: {}", header_line))?;
            let (action, meta) = header
                .as_object()
                .and_then(|obj| obj.iter().next())
                .ok_or_else(|| anyhow!("empty bulk header"))?;
            let id = meta
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("bulk header without _id: {}", header_line))?
                .to_string();

            let body = if action == "delete" {
                None
            } else {
                let line = lines
                    .next()
                    .ok_or_else(|| anyhow!("bulk {} for {} has no body line", action, id))?;
                Some(serde_json::from_str(line).with_context(|| format!("invalid bulk body: {}", line))?)
            };

            items.push(Self::apply_bulk_line(&self.name, &mut docs, action, id, body));
        }

        let errors = items.iter().any(|item| {
            item.as_object()
                .and_then(|obj| obj.values().next())
                .and_then(|d| d.get("status"))
                .and_then(Value::as_u64)
                .map_or(true, |s| s >= 300)
        });

        Ok(json!({ "took": 1, "errors": errors, "items": items }))
    }

    async fn search(&self, request: &Value) -> Result<Value> {
        let query = request.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        let size = request
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);
        let after = request
            .get("search_after")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(Value::as_str);

        Ok(json!({
            "took": 1,
            "timed_out": false,
            "hits": self.run_query(&query, size, after),
        }))
    }

    async fn mapping(&self) -> Result<Value> {
        let mappings = self.mappings.read().unwrap().clone();
        let mut out = Map::new();
        out.insert(self.name.clone(), json!({ "mappings": mappings }));
        Ok(Value::Object(out))
    }
}

fn matches(query: &Value, id: &str, source: &Value) -> bool {
    let Some((kind, body)) = query.as_object().and_then(|o| o.iter().next()) else {
        return false;
    };

    match kind.as_str() {
        "match_all" => true,
        "term" | "match" => body
            .as_object()
            .and_then(|o| o.iter().next())
            .map(|(field, expected)| {
                let expected = expected
                    .get("value")
                    .or_else(|| expected.get("query"))
                    .unwrap_or(expected);
                field_equals(field, expected, id, source)
            })
            .unwrap_or(false),
        "bool" => {
            let all = |key: &str| clauses(body.get(key)).all(|q| matches(q, id, source));
            let none = clauses(body.get("must_not")).all(|q| !matches(q, id, source));
            all("must") && all("filter") && none
        }
        _ => false,
    }
}

fn clauses(value: Option<&Value>) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Some(Value::Array(items)) => Box::new(items.iter()),
        Some(v @ Value::Object(_)) => Box::new(std::iter::once(v)),
        _ => Box::new(std::iter::empty()),
    }
}

fn field_equals(field: &str, expected: &Value, id: &str, source: &Value) -> bool {
    if field == "_id" {
        return expected.as_str() == Some(id);
    }
    let actual = get_field(source, field).or_else(|| {
        field
            .strip_suffix(".raw")
            .or_else(|| field.strip_suffix(".keyword"))
            .and_then(|base| get_field(source, base))
    });
    actual == Some(expected)
}

/// Recursive object merge, as applied by a partial `update`.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(&key).map_or(false, Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(&key) {
                        merge(existing, value);
                    }
                } else {
                    target.insert(key, value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
