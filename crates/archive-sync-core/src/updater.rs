//! Index update orchestration.
//!
//! [`IndexUpdater`] ties the pieces together for one run against one
//! index: existence check (template → search batches → `_msearch` →
//! reconcile), then bulk updates restricted to the documents that were
//! found. Batches go out one at a time; each response is consumed before
//! the next body is sent.
//!
//! Check and update are two separate round trips, so a concurrent writer
//! can change a document in between. Runs are meant to be repeatable: an
//! update is only sent when the indexed value differs from the target.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::batch::{BatchBuilder, BulkAction, BulkOperation};
use crate::bulk::BulkReport;
use crate::index::SearchIndex;
use crate::profile::{dir_doc, doc_id, get_field, nested_doc, IndexProfile, Location, SearchQuery};
use crate::reconcile::{reconcile, AmbiguousItem, MatchedHit, Present, Reconciliation, ResponseMode};

/// Which kind of round trip a progress event belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchPhase {
    Search,
    Bulk,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchPhase::Search => "search",
            BatchPhase::Bulk => "bulk",
        }
    }
}

/// Receives one event per completed batch.
pub trait BatchProgress: Send + Sync {
    fn batch_done(&self, phase: BatchPhase, done: usize, total: usize);
}

/// Progress sink that ignores every event.
pub struct Silent;

impl BatchProgress for Silent {
    fn batch_done(&self, _phase: BatchPhase, _done: usize, _total: usize) {}
}

/// Outcome of [`IndexUpdater::update_location`].
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    /// Paths with no document in the index, in input order.
    pub missing: Vec<String>,
    pub ambiguous: Vec<AmbiguousItem>,
    pub summary: UpdateSummary,
}

/// Outcome of [`IndexUpdater::update_checksums`].
#[derive(Debug, Clone)]
pub struct ChecksumUpdate {
    pub missing: Vec<String>,
    pub ambiguous: Vec<AmbiguousItem>,
    /// Paths skipped because no checksum was available for them.
    pub unavailable: Vec<String>,
    pub summary: UpdateSummary,
}

/// Counts for one update run; `Display` gives the one-line summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    pub index: String,
    pub processed: usize,
    /// Documents found whose field already held the target value.
    pub already_current: usize,
    pub missing: usize,
    pub ambiguous: usize,
    pub report: BulkReport,
}

impl UpdateSummary {
    /// Documents the index reports as changed.
    pub fn updated(&self) -> usize {
        self.report.docs_changed()
    }
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} files. Updated '{}' index. Updated {} files. {} files not in target index",
            self.processed,
            self.index,
            self.updated(),
            self.missing
        )?;
        if self.ambiguous > 0 {
            write!(f, ". {} files matched more than one document", self.ambiguous)?;
        }
        if self.report.failed > 0 {
            write!(f, ". {} updates failed", self.report.failed)?;
        }
        Ok(())
    }
}

/// Runs existence checks and bulk updates against one index.
pub struct IndexUpdater<'a, I: SearchIndex + ?Sized> {
    index: &'a I,
    batches: BatchBuilder,
    progress: &'a dyn BatchProgress,
}

impl<'a, I: SearchIndex + ?Sized> IndexUpdater<'a, I> {
    /// `blocksize` is the maximum number of sub-requests per call.
    pub fn new(index: &'a I, blocksize: usize) -> Result<Self> {
        Ok(Self {
            index,
            batches: BatchBuilder::new(blocksize)?,
            progress: &Silent,
        })
    }

    pub fn with_progress(mut self, progress: &'a dyn BatchProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn blocksize(&self) -> usize {
        self.batches.blocksize()
    }

    /// Classify `files` as present, absent or ambiguous in the index.
    pub async fn check_files_existence<S: AsRef<str>>(
        &self,
        query: &SearchQuery,
        files: &[S],
        mode: ResponseMode,
    ) -> Result<Reconciliation> {
        if files.is_empty() {
            return Ok(Reconciliation::empty(mode));
        }

        let batches = self
            .batches
            .search_batches(&query.template, query.params, files)?;
        debug!(
            index = self.index.name(),
            files = files.len(),
            batches = batches.len(),
            "existence check"
        );

        let mut responses = Vec::with_capacity(batches.len());
        for (n, batch) in batches.iter().enumerate() {
            responses.push(self.index.msearch(batch.body()).await?);
            self.progress
                .batch_done(BatchPhase::Search, n + 1, batches.len());
        }

        Ok(reconcile(&responses, files, self.blocksize(), mode)?)
    }

    /// Send `operations` as bulk `action` batches and total the results.
    pub async fn submit_bulk(
        &self,
        action: BulkAction,
        operations: &[BulkOperation],
    ) -> Result<BulkReport> {
        let batches = self.batches.bulk_batches(action, operations)?;
        let mut report = BulkReport::default();
        for (n, batch) in batches.iter().enumerate() {
            let response = self.index.bulk(batch.body()).await?;
            report.absorb(&response)?;
            self.progress.batch_done(BatchPhase::Bulk, n + 1, batches.len());
        }
        if report.failed > 0 {
            warn!(
                index = self.index.name(),
                failed = report.failed,
                "bulk {} reported failures",
                action
            );
        }
        Ok(report)
    }

    /// Set the location field of every indexed file in `files`.
    ///
    /// Documents already at `location` are left alone. Returns the paths
    /// that were not found along with the run summary.
    pub async fn update_location<S: AsRef<str>>(
        &self,
        files: &[S],
        profile: &IndexProfile,
        location: Location,
    ) -> Result<LocationUpdate> {
        let found = self
            .check_files_existence(&profile.query, files, ResponseMode::Raw)
            .await?;
        let hits = raw_hits(found.present);

        let target = Value::String(location.as_str().to_string());
        let (current, stale): (Vec<MatchedHit>, Vec<MatchedHit>) = hits
            .into_iter()
            .partition(|hit| get_field(&hit.source, profile.location_field) == Some(&target));

        info!(
            index = self.index.name(),
            to_update = stale.len(),
            already = current.len(),
            missing = found.absent.len(),
            "updating location to {}",
            location
        );

        let operations: Vec<BulkOperation> = stale
            .iter()
            .map(|hit| BulkOperation::new(&hit.id, nested_doc(profile.location_field, target.clone())))
            .collect();
        let report = self.submit_bulk(BulkAction::Update, &operations).await?;

        let summary = UpdateSummary {
            index: self.index.name().to_string(),
            processed: files.len(),
            already_current: current.len(),
            missing: found.absent.len(),
            ambiguous: found.ambiguous.len(),
            report,
        };

        Ok(LocationUpdate {
            missing: found.absent,
            ambiguous: found.ambiguous,
            summary,
        })
    }

    /// Bring indexed checksums in line with `checksums` (path → checksum).
    ///
    /// Paths with an empty checksum are skipped. Only documents whose
    /// stored value differs are updated.
    pub async fn update_checksums(
        &self,
        checksums: &BTreeMap<String, String>,
        profile: &IndexProfile,
    ) -> Result<ChecksumUpdate> {
        let field = profile.checksum_field.ok_or_else(|| {
            anyhow::anyhow!("index profile '{}' has no checksum field", profile.name)
        })?;

        let mut files: Vec<&str> = Vec::with_capacity(checksums.len());
        let mut unavailable: Vec<String> = Vec::new();
        for (path, sum) in checksums {
            if sum.is_empty() {
                unavailable.push(path.clone());
            } else {
                files.push(path);
            }
        }
        for path in &unavailable {
            warn!(path = %path, "no checksum available, skipping");
        }

        let found = self
            .check_files_existence(&profile.query, &files, ResponseMode::Raw)
            .await?;
        let hits = raw_hits(found.present);

        let mut operations = Vec::new();
        let mut already_current = 0usize;
        for hit in &hits {
            let wanted = &checksums[&hit.item];
            if get_field(&hit.source, field).and_then(Value::as_str) == Some(wanted.as_str()) {
                already_current += 1;
            } else {
                operations.push(BulkOperation::new(&hit.id, nested_doc(field, json!(wanted))));
            }
        }

        info!(
            index = self.index.name(),
            differing = operations.len(),
            already = already_current,
            missing = found.absent.len(),
            "updating checksums"
        );
        let report = self.submit_bulk(BulkAction::Update, &operations).await?;

        let summary = UpdateSummary {
            index: self.index.name().to_string(),
            processed: checksums.len(),
            already_current,
            missing: found.absent.len(),
            ambiguous: found.ambiguous.len(),
            report,
        };

        Ok(ChecksumUpdate {
            missing: found.absent,
            ambiguous: found.ambiguous,
            unavailable,
            summary,
        })
    }

    /// Delete the documents for `paths`, keyed by path hash.
    pub async fn delete_files<S: AsRef<str>>(&self, paths: &[S]) -> Result<BulkReport> {
        let operations: Vec<BulkOperation> = paths
            .iter()
            .map(|p| BulkOperation::delete(doc_id(p.as_ref())))
            .collect();
        self.submit_bulk(BulkAction::Delete, &operations).await
    }

    /// Index a document for each new directory, keyed by path hash.
    /// Re-indexing an existing directory replaces its document.
    pub async fn add_dirs<S: AsRef<str>>(&self, dirs: &[S]) -> Result<BulkReport> {
        let operations: Vec<BulkOperation> = dirs
            .iter()
            .map(|d| BulkOperation::new(doc_id(d.as_ref()), dir_doc(d.as_ref())))
            .collect();
        self.submit_bulk(BulkAction::Index, &operations).await
    }

    /// Set the `readme` field of directory documents (directory → content).
    ///
    /// Directories missing from the index come back as failed items.
    pub async fn update_readmes(&self, readmes: &BTreeMap<String, String>) -> Result<BulkReport> {
        let operations: Vec<BulkOperation> = readmes
            .iter()
            .map(|(dir, content)| BulkOperation::new(doc_id(dir), json!({ "readme": content })))
            .collect();
        self.submit_bulk(BulkAction::Update, &operations).await
    }
}

fn raw_hits(present: Present) -> Vec<MatchedHit> {
    match present {
        Present::Raw(hits) => hits,
        // Raw mode was requested; a filtered bucket carries no ids.
        Present::Filtered(_) => Vec::new(),
    }
}
