//! Bulk stage operations across many batches
//!
//! Each batch is its own failure boundary: an error in one batch is recorded
//! in the report and the remaining batches are still attempted. The one
//! exception is bulk advance's soaking guard, which vetoes the whole
//! operation before any batch is touched.
//!
//! Membership of every selected batch is fixed before the first transition.
//! Advancing a germination batch can merge it into a blackout batch from the
//! same planting date; the blackout batch then still moves only its own crops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::transition::{ErrorKind, TransitionEngine, TransitionError};
use crate::entities::BatchKey;

/// Every warning produced by an operation, with a capped view for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WarningLog {
    entries: Vec<String>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: impl Into<String>) {
        self.entries.push(warning.into());
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, warnings: I) {
        self.entries.extend(warnings);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The first `limit` warnings, plus an "...and K more" line if any were cut
    pub fn summary(&self, limit: usize) -> Vec<String> {
        let mut lines: Vec<String> = self.entries.iter().take(limit).cloned().collect();
        if self.entries.len() > limit {
            lines.push(format!("...and {} more", self.entries.len() - limit));
        }
        lines
    }
}

/// A batch whose transition failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub batch: BatchKey,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a bulk advance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkAdvanceReport {
    pub total_affected_units: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    /// Set when the soaking guard vetoed the whole operation
    pub aborted: bool,
    pub warnings: WarningLog,
    pub failures: Vec<BatchFailure>,
}

/// Result of a bulk revert
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkRevertReport {
    pub total_affected_units: usize,
    pub batches_succeeded: usize,
    pub batches_skipped: usize,
    pub batches_failed: usize,
    pub warnings: WarningLog,
    pub skipped: Vec<BatchKey>,
    pub failures: Vec<BatchFailure>,
}

/// Runs transitions over caller-selected batches, one batch at a time
pub struct BatchOperationCoordinator<'a> {
    engine: TransitionEngine<'a>,
}

impl<'a> BatchOperationCoordinator<'a> {
    pub fn new(engine: TransitionEngine<'a>) -> Self {
        Self { engine }
    }

    /// Advance every selected batch to its next stage
    ///
    /// If any selected batch is soaking, nothing is advanced: the report is
    /// marked aborted and names the soaking batches.
    pub fn bulk_advance(&self, batches: &[BatchKey], at: DateTime<Utc>) -> BulkAdvanceReport {
        let batches = dedup(batches);
        let mut report = BulkAdvanceReport::default();

        let registry = self.engine.registry();
        let soaking: Vec<&BatchKey> = batches
            .iter()
            .filter(|key| registry.requires_identity_assignment(key.stage))
            .collect();
        if !soaking.is_empty() {
            for key in &soaking {
                report.warnings.push(format!(
                    "Batch {} is soaking; assign tray numbers to its crops individually",
                    key
                ));
            }
            report.aborted = true;
            warn!(
                soaking = soaking.len(),
                selected = batches.len(),
                "Bulk advance aborted: selection contains soaking batches"
            );
            return report;
        }

        for (key, members) in self.snapshot(&batches) {
            let key = &key;
            let result = members.and_then(|ids| self.engine.advance_members(key, &ids, at));
            match result {
                Ok(outcome) => {
                    report.total_affected_units += outcome.affected_count;
                    report.batches_succeeded += 1;
                    report.warnings.extend(outcome.warnings);
                }
                Err(err) => {
                    warn!(batch = %key, error = %err, "Bulk advance failed for batch");
                    report.warnings.push(format!("Batch {}: {}", key, err));
                    report.batches_failed += 1;
                    report.failures.push(failure(key, &err));
                }
            }
        }

        info!(
            succeeded = report.batches_succeeded,
            failed = report.batches_failed,
            units = report.total_affected_units,
            "Bulk advance finished"
        );
        report
    }

    /// Revert every selected batch to its previous stage
    ///
    /// Batches already at the first stage are skipped rather than failed.
    pub fn bulk_revert(&self, batches: &[BatchKey], reason: Option<&str>) -> BulkRevertReport {
        let batches = dedup(batches);
        let mut report = BulkRevertReport::default();

        for (key, members) in self.snapshot(&batches) {
            let key = &key;
            let result = members.and_then(|ids| self.engine.revert_members(key, &ids, reason));
            match result {
                Ok(outcome) => {
                    report.total_affected_units += outcome.affected_count;
                    report.batches_succeeded += 1;
                    report.warnings.extend(outcome.warnings);
                }
                Err(TransitionError::AlreadyAtFirstStage(_)) => {
                    report
                        .warnings
                        .push(format!("Batch {} is already at first stage, skipped", key));
                    report.batches_skipped += 1;
                    report.skipped.push(*key);
                }
                Err(err) => {
                    warn!(batch = %key, error = %err, "Bulk revert failed for batch");
                    report.warnings.push(format!("Batch {}: {}", key, err));
                    report.batches_failed += 1;
                    report.failures.push(failure(key, &err));
                }
            }
        }

        info!(
            succeeded = report.batches_succeeded,
            skipped = report.batches_skipped,
            failed = report.batches_failed,
            units = report.total_affected_units,
            "Bulk revert finished"
        );
        report
    }

    /// Member IDs of every batch, taken before any batch is transitioned
    fn snapshot(
        &self,
        batches: &[BatchKey],
    ) -> Vec<(BatchKey, Result<Vec<i64>, TransitionError>)> {
        batches
            .iter()
            .map(|key| (*key, self.engine.member_ids(key)))
            .collect()
    }
}

fn failure(key: &BatchKey, err: &TransitionError) -> BatchFailure {
    BatchFailure {
        batch: *key,
        kind: err.kind(),
        message: err.to_string(),
    }
}

/// Drop repeated batch keys, keeping first-seen order
fn dedup(batches: &[BatchKey]) -> Vec<BatchKey> {
    let mut seen = std::collections::HashSet::new();
    batches
        .iter()
        .filter(|key| seen.insert(**key))
        .copied()
        .collect()
}
