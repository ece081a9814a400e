//! Error types for request construction and response reconciliation.
//!
//! Remote failures (network, non-2xx) are reported through `anyhow` by the
//! [`SearchIndex`](crate::index::SearchIndex) implementations; the variants
//! here cover mistakes in building requests or reading responses back.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// A template token had no value in the item's parameter map.
    #[error("missing template parameter: <{0}>")]
    MissingParameter(String),

    /// Bulk action name other than index, update or delete.
    #[error("invalid bulk action '{0}': must be one of index|update|delete")]
    InvalidAction(String),

    #[error("blocksize must be > 0")]
    InvalidBlocksize,

    /// Sub-responses could not be lined up with the submitted items.
    #[error("response misaligned with request: {0}")]
    MisalignedResponse(String),

    #[error("malformed index response: {0}")]
    MalformedResponse(String),

    /// The index answered a single sub-request with an error object.
    #[error("sub-request for '{item}' failed: {reason}")]
    SubRequestFailed { item: String, reason: String },
}

pub type BatchResult<T> = Result<T, BatchError>;
