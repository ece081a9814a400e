//! Positional reconciliation of `_msearch` responses with the submitted items.
//!
//! Sub-response `i` of response `b` answers item `b * blocksize + i`. Each
//! item is classified by its hit count:
//!
//! | hits | bucket |
//! |------|--------|
//! | 0 | `absent` |
//! | 1 | `present` |
//! | >1 | `ambiguous` |
//!
//! so every input item lands in exactly one bucket, in input order.
//! Responses that cannot be lined up with the items are rejected rather
//! than guessed at.

use serde_json::Value;

use crate::error::{BatchError, BatchResult};

/// What to keep for items that matched exactly one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Keep the item only.
    Filtered,
    /// Keep the item along with the matching document's id and source.
    Raw,
}

/// A single-hit match with the document as the index returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedHit {
    pub item: String,
    pub id: String,
    pub source: Value,
}

/// The `present` bucket, shaped by the [`ResponseMode`] that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Present {
    Filtered(Vec<String>),
    Raw(Vec<MatchedHit>),
}

impl Present {
    fn empty(mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Filtered => Present::Filtered(Vec::new()),
            ResponseMode::Raw => Present::Raw(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Present::Filtered(items) => items.len(),
            Present::Raw(hits) => hits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matched items in input order, whichever mode was used.
    pub fn items(&self) -> Vec<&str> {
        match self {
            Present::Filtered(items) => items.iter().map(String::as_str).collect(),
            Present::Raw(hits) => hits.iter().map(|h| h.item.as_str()).collect(),
        }
    }
}

/// An item whose query matched more than one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousItem {
    pub item: String,
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub present: Present,
    pub absent: Vec<String>,
    pub ambiguous: Vec<AmbiguousItem>,
}

impl Reconciliation {
    pub fn empty(mode: ResponseMode) -> Self {
        Self {
            present: Present::empty(mode),
            absent: Vec::new(),
            ambiguous: Vec::new(),
        }
    }

    /// Total number of classified items.
    pub fn total(&self) -> usize {
        self.present.len() + self.absent.len() + self.ambiguous.len()
    }
}

/// Classify `items` against the `_msearch` responses produced for them.
pub fn reconcile<S: AsRef<str>>(
    responses: &[Value],
    items: &[S],
    blocksize: usize,
    mode: ResponseMode,
) -> BatchResult<Reconciliation> {
    if blocksize == 0 {
        return Err(BatchError::InvalidBlocksize);
    }

    let mut out = Reconciliation::empty(mode);
    let mut consumed = 0usize;

    for (block_index, response) in responses.iter().enumerate() {
        let subs = response
            .get("responses")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                BatchError::MalformedResponse(format!(
                    "block {block_index} has no 'responses' array"
                ))
            })?;

        let is_last = block_index + 1 == responses.len();
        if subs.len() > blocksize || (!is_last && subs.len() != blocksize) {
            return Err(BatchError::MisalignedResponse(format!(
                "block {} carries {} sub-responses with blocksize {}",
                block_index,
                subs.len(),
                blocksize
            )));
        }

        for (offset, sub) in subs.iter().enumerate() {
            let position = block_index * blocksize + offset;
            let item = items.get(position).ok_or_else(|| {
                BatchError::MisalignedResponse(format!(
                    "sub-response at position {} but only {} items were submitted",
                    position,
                    items.len()
                ))
            })?;
            classify(&mut out, item.as_ref(), sub)?;
            consumed += 1;
        }
    }

    if consumed != items.len() {
        return Err(BatchError::MisalignedResponse(format!(
            "{} items submitted but {} sub-responses received",
            items.len(),
            consumed
        )));
    }

    Ok(out)
}

fn classify(out: &mut Reconciliation, item: &str, sub: &Value) -> BatchResult<()> {
    if let Some(error) = sub.get("error") {
        let reason = error
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(BatchError::SubRequestFailed {
            item: item.to_string(),
            reason,
        });
    }

    let hits = sub
        .get("hits")
        .ok_or_else(|| BatchError::MalformedResponse(format!("no 'hits' for '{item}'")))?;

    match hit_total(hits) {
        Some(0) => out.absent.push(item.to_string()),
        Some(1) => match &mut out.present {
            Present::Filtered(items) => items.push(item.to_string()),
            Present::Raw(matched) => {
                let hit = hits
                    .get("hits")
                    .and_then(Value::as_array)
                    .and_then(|h| h.first())
                    .ok_or_else(|| {
                        BatchError::MalformedResponse(format!(
                            "hit counted for '{item}' but no document returned"
                        ))
                    })?;
                let id = hit.get("_id").and_then(Value::as_str).ok_or_else(|| {
                    BatchError::MalformedResponse(format!("hit for '{item}' has no _id"))
                })?;
                matched.push(MatchedHit {
                    item: item.to_string(),
                    id: id.to_string(),
                    source: hit.get("_source").cloned().unwrap_or(Value::Null),
                });
            }
        },
        Some(n) => out.ambiguous.push(AmbiguousItem {
            item: item.to_string(),
            hits: n,
        }),
        None => {
            return Err(BatchError::MalformedResponse(format!(
                "unreadable hit total for '{item}'"
            )))
        }
    }
    Ok(())
}

/// `hits.total` is a number on older clusters and `{"value": n}` on newer
/// ones; fall back to the length of `hits.hits`.
fn hit_total(hits: &Value) -> Option<u64> {
    match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::Object(obj)) => obj.get("value").and_then(Value::as_u64),
        _ => hits
            .get("hits")
            .and_then(Value::as_array)
            .map(|h| h.len() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn sub(hit_ids: &[&str]) -> Value {
        let hits: Vec<Value> = hit_ids
            .iter()
            .map(|id| json!({"_id": id, "_source": {"path": id}}))
            .collect();
        json!({"hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}})
    }

    /// Fabricate responses for `items` where members of `exists` get one hit.
    fn fabricate(items: &[String], exists: &HashSet<String>, blocksize: usize) -> Vec<Value> {
        items
            .chunks(blocksize)
            .map(|block| {
                let subs: Vec<Value> = block
                    .iter()
                    .map(|i| {
                        if exists.contains(i) {
                            sub(&[i.as_str()])
                        } else {
                            sub(&[])
                        }
                    })
                    .collect();
                json!({ "responses": subs })
            })
            .collect()
    }

    #[test]
    fn partition_is_independent_of_blocksize() {
        let items: Vec<String> = (0..10).map(|i| format!("/data/f{i}.nc")).collect();
        let exists: HashSet<String> = items.iter().step_by(3).cloned().collect();

        let mut expected_present: Vec<String> = Vec::new();
        let mut expected_absent: Vec<String> = Vec::new();
        for i in &items {
            if exists.contains(i) {
                expected_present.push(i.clone());
            } else {
                expected_absent.push(i.clone());
            }
        }

        for blocksize in [1, 3, 800] {
            let responses = fabricate(&items, &exists, blocksize);
            let rec = reconcile(&responses, &items, blocksize, ResponseMode::Filtered).unwrap();
            assert_eq!(rec.present, Present::Filtered(expected_present.clone()));
            assert_eq!(rec.absent, expected_absent);
            assert!(rec.ambiguous.is_empty());
            assert_eq!(rec.total(), items.len());
        }
    }

    #[test]
    fn raw_mode_keeps_hit_payload() {
        let items = vec!["/a/x.nc".to_string(), "/a/y.nc".to_string(), "/b/z.nc".to_string()];
        let responses = vec![
            json!({"responses": [sub(&["/a/x.nc"]), sub(&[])]}),
            json!({"responses": [sub(&["/b/z.nc"])]}),
        ];
        let rec = reconcile(&responses, &items, 2, ResponseMode::Raw).unwrap();
        match &rec.present {
            Present::Raw(hits) => {
                assert_eq!(hits.len(), 2);
                assert_eq!(hits[0].item, "/a/x.nc");
                assert_eq!(hits[1].id, "/b/z.nc");
                assert_eq!(hits[1].source["path"], "/b/z.nc");
            }
            other => panic!("expected raw hits, got {other:?}"),
        }
        assert_eq!(rec.absent, vec!["/a/y.nc"]);
        assert_eq!(rec.present.items(), vec!["/a/x.nc", "/b/z.nc"]);
    }

    #[test]
    fn multiple_hits_go_to_ambiguous() {
        let items = vec!["a", "b"];
        let responses = vec![json!({"responses": [sub(&["1", "2"]), sub(&["3"])]})];
        let rec = reconcile(&responses, &items, 800, ResponseMode::Filtered).unwrap();
        assert_eq!(
            rec.ambiguous,
            vec![AmbiguousItem {
                item: "a".into(),
                hits: 2
            }]
        );
        assert_eq!(rec.present.items(), vec!["b"]);
        assert_eq!(rec.total(), 2);
    }

    #[test]
    fn numeric_total_is_accepted() {
        let items = vec!["a"];
        let responses = vec![json!({"responses": [{"hits": {"total": 0, "hits": []}}]})];
        let rec = reconcile(&responses, &items, 10, ResponseMode::Filtered).unwrap();
        assert_eq!(rec.absent, vec!["a"]);
    }

    #[test]
    fn too_few_sub_responses_is_misaligned() {
        let items = vec!["a", "b", "c"];
        let responses = vec![json!({"responses": [sub(&[]), sub(&[])]})];
        let err = reconcile(&responses, &items, 800, ResponseMode::Filtered).unwrap_err();
        assert!(matches!(err, BatchError::MisalignedResponse(_)));
    }

    #[test]
    fn short_non_final_block_is_misaligned() {
        let items = vec!["a", "b", "c"];
        let responses = vec![
            json!({"responses": [sub(&[])]}),
            json!({"responses": [sub(&[]), sub(&[])]}),
        ];
        let err = reconcile(&responses, &items, 2, ResponseMode::Filtered).unwrap_err();
        assert!(matches!(err, BatchError::MisalignedResponse(_)));
    }

    #[test]
    fn extra_sub_responses_are_misaligned() {
        let items = vec!["a", "b"];
        let responses = vec![json!({"responses": [sub(&[]), sub(&[]), sub(&[])]})];
        let err = reconcile(&responses, &items, 800, ResponseMode::Filtered).unwrap_err();
        match err {
            BatchError::MisalignedResponse(msg) => assert!(msg.contains("only 2 items"), "{msg}"),
            other => panic!("expected misalignment, got {other:?}"),
        }
    }

    #[test]
    fn block_larger_than_blocksize_is_misaligned() {
        let items = vec!["a", "b", "c"];
        let responses = vec![json!({"responses": [sub(&[]), sub(&[]), sub(&[])]})];
        let err = reconcile(&responses, &items, 2, ResponseMode::Filtered).unwrap_err();
        match err {
            BatchError::MisalignedResponse(msg) => {
                assert!(msg.contains("3 sub-responses with blocksize 2"), "{msg}")
            }
            other => panic!("expected misalignment, got {other:?}"),
        }
    }

    #[test]
    fn sub_request_error_names_the_item() {
        let items = vec!["a"];
        let responses = vec![json!({"responses": [
            {"error": {"type": "index_not_found_exception", "reason": "no such index"}, "status": 404}
        ]})];
        let err = reconcile(&responses, &items, 800, ResponseMode::Filtered).unwrap_err();
        assert_eq!(
            err,
            BatchError::SubRequestFailed {
                item: "a".into(),
                reason: "no such index".into()
            }
        );
    }

    #[test]
    fn no_responses_for_no_items() {
        let items: Vec<String> = Vec::new();
        let rec = reconcile(&[], &items, 800, ResponseMode::Raw).unwrap();
        assert_eq!(rec, Reconciliation::empty(ResponseMode::Raw));
    }
}
