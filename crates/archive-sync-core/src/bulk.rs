//! Consolidated reporting over `_bulk` responses.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::{BatchError, BatchResult};

/// One bulk item the index rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub id: String,
    pub status: u16,
    pub error: Value,
}

/// Totals accumulated over every bulk response of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    /// Batches submitted.
    pub batches: usize,
    /// Sum of the index's `took` milliseconds.
    pub took_ms: u64,
    /// True if any batch reported `errors`.
    pub errors: bool,
    /// Items with a 2xx status, noops included.
    pub success: usize,
    /// Items that left the document unchanged (`result: noop`).
    pub noop: usize,
    pub failed: usize,
    pub failed_items: Vec<FailedItem>,
}

impl BulkReport {
    pub fn from_responses(responses: &[Value]) -> BatchResult<Self> {
        let mut report = BulkReport::default();
        for response in responses {
            report.absorb(response)?;
        }
        Ok(report)
    }

    /// Fold one `_bulk` response into the totals.
    pub fn absorb(&mut self, response: &Value) -> BatchResult<()> {
        let items = response
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| BatchError::MalformedResponse("bulk response has no 'items'".into()))?;

        self.batches += 1;
        self.took_ms += response.get("took").and_then(Value::as_u64).unwrap_or(0);
        self.errors |= response
            .get("errors")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        for item in items {
            // Each item is {"<action>": {...}} with a single key.
            let detail = item
                .as_object()
                .and_then(|obj| obj.values().next())
                .ok_or_else(|| BatchError::MalformedResponse(format!("bad bulk item: {item}")))?;

            let status = detail.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
            if (200..300).contains(&status) {
                self.success += 1;
                if detail.get("result").and_then(Value::as_str) == Some("noop") {
                    self.noop += 1;
                }
            } else {
                self.failed += 1;
                self.failed_items.push(FailedItem {
                    id: detail
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status,
                    error: detail.get("error").cloned().unwrap_or(Value::Null),
                });
            }
        }
        Ok(())
    }

    /// Documents actually created, updated or deleted.
    pub fn docs_changed(&self) -> usize {
        self.success - self.noop
    }
}

impl fmt::Display for BulkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches in {} ms: {} changed, {} unchanged, {} failed",
            self.batches,
            self.took_ms,
            self.docs_changed(),
            self.noop,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_success_noop_and_failures() {
        let responses = vec![
            json!({"took": 5, "errors": false, "items": [
                {"update": {"_id": "a", "status": 200, "result": "updated"}},
                {"update": {"_id": "b", "status": 200, "result": "noop"}}
            ]}),
            json!({"took": 7, "errors": true, "items": [
                {"update": {"_id": "c", "status": 404, "error": {"type": "document_missing_exception"}}},
                {"delete": {"_id": "d", "status": 200, "result": "deleted"}}
            ]}),
        ];
        let report = BulkReport::from_responses(&responses).unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.took_ms, 12);
        assert!(report.errors);
        assert_eq!(report.success, 3);
        assert_eq!(report.noop, 1);
        assert_eq!(report.docs_changed(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_items[0].id, "c");
        assert_eq!(report.failed_items[0].status, 404);
    }

    #[test]
    fn missing_items_is_malformed() {
        let err = BulkReport::from_responses(&[json!({"took": 1})]).unwrap_err();
        assert!(matches!(err, BatchError::MalformedResponse(_)));
    }
}
