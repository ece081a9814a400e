//! Abstraction over the remote document index.
//!
//! The [`SearchIndex`] trait covers the endpoints the updater and the
//! download command need.
//! Bodies go out exactly as built by [`crate::batch`]; responses come back
//! as parsed JSON in the index's own shape.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A document index reachable through multi-search, bulk and search calls.
///
/// | Method | Endpoint |
/// |--------|----------|
/// | [`msearch`](SearchIndex::msearch) | `POST /{index}/_msearch` (NDJSON) |
/// | [`bulk`](SearchIndex::bulk) | `POST /{index}/_bulk` (NDJSON) |
/// | [`search`](SearchIndex::search) | `POST /{index}/_search` (JSON) |
/// | [`mapping`](SearchIndex::mapping) | `GET /{index}/_mapping` |
///
/// Errors are remote failures: the request could not be sent, or the
/// index answered with a non-2xx status.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Name of the index requests are routed to.
    fn name(&self) -> &str;

    async fn msearch(&self, body: &str) -> Result<Value>;

    async fn bulk(&self, body: &str) -> Result<Value>;

    async fn search(&self, query: &Value) -> Result<Value>;

    /// The index mapping, keyed by concrete index name.
    async fn mapping(&self) -> Result<Value>;
}
