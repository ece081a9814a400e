//! # archive-sync
//!
//! Keep an Elasticsearch file index in step with a filesystem archive.
//!
//! File paths come in as plain lists or from the archive's deposit and
//! checksum logs. Each run renders one query per path, sends the queries
//! in `_msearch` batches, lines the answers back up with the paths, and
//! sends `_bulk` updates for the documents that were found.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │ lists / logs │──▶│ archive-sync-core │──▶│  HttpIndex    │
//! │ logs, filter │   │ batch + reconcile │   │ _msearch/_bulk│
//! └──────────────┘   └─────────┬─────────┘   └───────────────┘
//!                              ▼
//!                     summaries, marker lists,
//!                     missing-file lists
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! esync check --file lists/spot-1234.txt
//! esync location --file on_tape.txt --on-tape --missing
//! esync checksums --log checkm.2017-08-20 --archive-root /badc/msg
//! esync deposit --calculate
//! esync report --directory ./esync-output
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | HTTP implementation of the index trait |
//! | [`logs`] | File lists, checksum logs, deposit logs |
//! | [`filter`] | Per-index path filters |
//! | [`progress`] | Batch progress on stderr |
//! | [`outcome`] | Per-unit results for multi-unit runs |
//! | [`check`] | Existence checks with per-list result files |
//! | [`location`] | On-disk / on-tape location updates |
//! | [`checksums`] | Checksum updates from logs or file hashes |
//! | [`deposit`] | Deposit log processing |
//! | [`download`] | Paged JSON dump of an index |
//! | [`summary`] | Table of check results |

pub mod check;
pub mod checksums;
pub mod client;
pub mod config;
pub mod deposit;
pub mod download;
pub mod filter;
pub mod location;
pub mod logs;
pub mod outcome;
pub mod progress;
pub mod summary;
