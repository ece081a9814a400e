//! # archive-sync core
//!
//! Request-building and reconciliation logic for keeping a document index
//! in step with a filesystem archive.
//!
//! This crate has no tokio, HTTP client, or filesystem dependencies. The
//! remote index sits behind the [`index::SearchIndex`] trait; the
//! in-memory implementation in [`index::memory`] backs the tests.
//!
//! ```text
//! paths ──▶ template ──▶ batch ──▶ SearchIndex::msearch ──▶ reconcile
//!                                                              │
//!            BulkReport ◀── SearchIndex::bulk ◀── batch ◀──────┘
//! ```

pub mod batch;
pub mod bulk;
pub mod error;
pub mod index;
pub mod profile;
pub mod reconcile;
pub mod template;
pub mod updater;

pub use error::BatchError;
