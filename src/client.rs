//! HTTP client for a remote search index.
//!
//! [`HttpIndex`] implements the core [`SearchIndex`] trait over the
//! Elasticsearch REST API:
//!
//! | Call | Request |
//! |------|---------|
//! | `msearch` | `POST {url}/{index}/_msearch` (NDJSON) |
//! | `bulk` | `POST {url}/{index}/_bulk` (NDJSON) |
//! | `search` | `POST {url}/{index}/_search` (JSON) |
//! | `mapping` | `GET {url}/{index}/_mapping` |
//!
//! A non-2xx status is an error carrying the response body. There is no
//! retry: a failed run is recovered by running it again.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use archive_sync_core::index::SearchIndex;

use crate::config::Config;

const NDJSON: &str = "application/x-ndjson";

pub struct HttpIndex {
    client: reqwest::Client,
    base_url: String,
    name: String,
    api_key: Option<String>,
}

impl HttpIndex {
    pub fn new(
        base_url: &str,
        name: &str,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            name: name.to_string(),
            api_key,
        })
    }

    /// Client for the index named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::for_index(config, &config.index.name)
    }

    /// Client for the directory index, if `[dirs].index` is set.
    pub fn dirs_from_config(config: &Config) -> Result<Option<Self>> {
        config
            .dirs
            .index
            .as_deref()
            .map(|name| Self::for_index(config, name))
            .transpose()
    }

    /// Client for another index on the configured cluster.
    pub fn for_index(config: &Config, name: &str) -> Result<Self> {
        Self::new(
            &config.index.url,
            name,
            Duration::from_secs(config.index.timeout_secs),
            config.api_key()?,
        )
    }

    fn endpoint(&self, api: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.name, api)
    }

    async fn post(&self, api: &str, content_type: &str, body: String) -> Result<Value> {
        let url = self.endpoint(api);
        debug!(url = %url, bytes = body.len(), "POST");
        let request = self
            .client
            .post(&url)
            .header("Content-Type", content_type)
            .body(body);
        self.send(request, &url).await
    }

    async fn get(&self, api: &str) -> Result<Value> {
        let url = self.endpoint(api);
        debug!(url = %url, "GET");
        let request = self.client.get(&url);
        self.send(request, &url).await
    }

    async fn send(&self, mut request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Index API error {} from {}: {}", status, url, body_text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON response from {}", url))
    }
}

#[async_trait]
impl SearchIndex for HttpIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn msearch(&self, body: &str) -> Result<Value> {
        self.post("_msearch", NDJSON, body.to_string()).await
    }

    async fn bulk(&self, body: &str) -> Result<Value> {
        self.post("_bulk", NDJSON, body.to_string()).await
    }

    async fn search(&self, query: &Value) -> Result<Value> {
        self.post("_search", "application/json", query.to_string())
            .await
    }

    async fn mapping(&self) -> Result<Value> {
        self.get("_mapping").await
    }
}
