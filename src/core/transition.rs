//! Transition engine - stage changes for whole batches
//!
//! A crop never changes stage alone: advancing or reverting resolves the
//! crop's batch (same recipe, planting date and stage) and moves every
//! member inside one transaction. The only per-crop transition is leaving
//! the soaking stage, which needs a tray number for each crop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::stage::{Stage, StageRegistry};
use crate::core::store::{CropStore, HistoryAction, NewHistoryEntry, StoreError, StoreTx};
use crate::entities::{BatchKey, Crop};

/// Broad classification of a transition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request breaks a lifecycle rule; nothing was changed
    Validation,
    /// The referenced crop or batch does not exist
    NotFound,
    /// The database failed
    Storage,
}

/// Errors that can occur during stage transitions
#[derive(Debug, Error, miette::Diagnostic)]
pub enum TransitionError {
    #[error("Crop not found: {0}")]
    #[diagnostic(code(growline::transition::crop_not_found))]
    CropNotFound(i64),

    #[error("Batch {0} has no crops")]
    #[diagnostic(code(growline::transition::empty_batch))]
    EmptyBatch(BatchKey),

    #[error("Batch {0} is already harvested")]
    #[diagnostic(code(growline::transition::harvested))]
    AlreadyHarvested(BatchKey),

    #[error("Batch {0} is soaking and cannot be advanced as a batch")]
    #[diagnostic(
        code(growline::transition::soaking_batch),
        help("assign a tray number to each crop with `growline crop exit-soak <ID> --tray <TRAY>`")
    )]
    SoakingBatch(BatchKey),

    #[error("Batch {0} is already at first stage")]
    #[diagnostic(code(growline::transition::first_stage))]
    AlreadyAtFirstStage(BatchKey),

    #[error("Batch {batch} changed since it was selected (crop {crop_id} moved)")]
    #[diagnostic(
        code(growline::transition::batch_changed),
        help("list batches again and retry")
    )]
    BatchChanged { batch: BatchKey, crop_id: i64 },

    #[error("Crop {crop_id} is not soaking (current stage: {stage})")]
    #[diagnostic(code(growline::transition::not_soaking))]
    NotSoaking { crop_id: i64, stage: Stage },

    #[error("A tray number is required to leave the soaking stage")]
    #[diagnostic(code(growline::transition::missing_tray))]
    MissingTray,

    #[error("Tray {tray} is already in use by crop {holder}")]
    #[diagnostic(code(growline::transition::tray_in_use))]
    TrayInUse { tray: String, holder: i64 },

    #[error("Watering can only be suspended during the light stage (batch is in {stage})")]
    #[diagnostic(code(growline::watering::wrong_stage))]
    WateringWrongStage { stage: Stage },

    #[error("Watering is already suspended for crop {crop_id}")]
    #[diagnostic(code(growline::watering::already_suspended))]
    WateringAlreadySuspended { crop_id: i64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::CropNotFound(_) | TransitionError::EmptyBatch(_) => {
                ErrorKind::NotFound
            }
            TransitionError::Store(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// A requested stage transition
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Move the whole batch to the next stage
    Advance { at: DateTime<Utc> },
    /// Move the whole batch back to the previous stage
    Revert { reason: Option<String> },
    /// Take one soaking crop into germination under a tray number
    ExitSoaking { tray: String, at: DateTime<Utc> },
}

/// Result of a committed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    /// The batch as it was before the transition
    pub batch: BatchKey,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub affected_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Executes stage transitions against the crop store
#[derive(Clone, Copy)]
pub struct TransitionEngine<'a> {
    store: &'a CropStore,
    registry: &'a StageRegistry,
}

impl<'a> TransitionEngine<'a> {
    pub fn new(store: &'a CropStore, registry: &'a StageRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &'a CropStore {
        self.store
    }

    pub fn registry(&self) -> &'a StageRegistry {
        self.registry
    }

    /// Apply any transition to the batch (or crop) `crop_id` belongs to
    pub fn apply(
        &self,
        crop_id: i64,
        transition: Transition,
    ) -> Result<TransitionOutcome, TransitionError> {
        match transition {
            Transition::Advance { at } => self.advance_stage(crop_id, at),
            Transition::Revert { reason } => self.revert_stage(crop_id, reason.as_deref()),
            Transition::ExitSoaking { tray, at } => {
                let batch = self
                    .store
                    .crop(crop_id)?
                    .ok_or(TransitionError::CropNotFound(crop_id))?
                    .batch_key();
                let crop = self.advance_from_soaking_at(crop_id, &tray, at)?;
                Ok(TransitionOutcome {
                    batch,
                    from_stage: batch.stage,
                    to_stage: crop.current_stage,
                    affected_count: 1,
                    warnings: Vec::new(),
                })
            }
        }
    }

    /// Resolve the batch a crop belongs to, inside an open transaction
    pub fn resolve_batch(
        &self,
        tx: &StoreTx<'_>,
        crop_id: i64,
    ) -> Result<(BatchKey, Vec<Crop>), TransitionError> {
        let crop = tx
            .crop(crop_id)?
            .ok_or(TransitionError::CropNotFound(crop_id))?;
        let key = crop.batch_key();
        let members = tx.batch_members(&key)?;
        if members.is_empty() {
            return Err(TransitionError::EmptyBatch(key));
        }
        debug!(crop_id, batch = %key, members = members.len(), "Resolved batch");
        Ok((key, members))
    }

    /// Current member IDs of a batch
    ///
    /// Bulk operations take this snapshot before mutating anything, so a
    /// batch that another transition merges into later is not dragged along.
    pub fn member_ids(&self, key: &BatchKey) -> Result<Vec<i64>, TransitionError> {
        let ids: Vec<i64> = self
            .store
            .batch_members(key)?
            .iter()
            .map(|crop| crop.id)
            .collect();
        if ids.is_empty() {
            return Err(TransitionError::EmptyBatch(*key));
        }
        Ok(ids)
    }

    /// Load a member snapshot inside the transaction, checking each crop is still in `key`
    fn load_members(
        &self,
        tx: &StoreTx<'_>,
        key: &BatchKey,
        ids: &[i64],
    ) -> Result<Vec<Crop>, TransitionError> {
        if ids.is_empty() {
            return Err(TransitionError::EmptyBatch(*key));
        }
        ids.iter()
            .map(|&id| {
                let crop = tx.crop(id)?.ok_or(TransitionError::CropNotFound(id))?;
                if crop.batch_key() != *key {
                    return Err(TransitionError::BatchChanged {
                        batch: *key,
                        crop_id: id,
                    });
                }
                Ok(crop)
            })
            .collect()
    }

    /// Advance the crop's whole batch to the next stage
    ///
    /// Soaking batches are rejected: they leave soaking one crop at a time
    /// through [`advance_from_soaking`](Self::advance_from_soaking). An
    /// advance time earlier than a crop's current stage timestamp is applied
    /// but reported as a warning.
    pub fn advance_stage(
        &self,
        crop_id: i64,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let tx = self.store.begin()?;
        let (key, members) = self.resolve_batch(&tx, crop_id)?;
        self.advance_in(tx, key, members, at)
    }

    /// Advance exactly the crops in `ids`, which must all still belong to `key`
    pub fn advance_members(
        &self,
        key: &BatchKey,
        ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let tx = self.store.begin()?;
        let members = self.load_members(&tx, key, ids)?;
        self.advance_in(tx, *key, members, at)
    }

    fn advance_in(
        &self,
        tx: StoreTx<'_>,
        key: BatchKey,
        members: Vec<Crop>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if self.registry.requires_identity_assignment(key.stage) {
            return Err(TransitionError::SoakingBatch(key));
        }
        let next = self
            .registry
            .next(key.stage)
            .ok_or(TransitionError::AlreadyHarvested(key))?;

        let mut warnings = Vec::new();
        let mut affected_count = 0;
        for mut crop in members {
            let entered = crop.stage_at(key.stage).unwrap_or(crop.stage_updated_at);
            if at < entered {
                warn!(crop_id = crop.id, stage = %key.stage, "Advance time precedes stage entry");
                warnings.push(format!(
                    "Crop {}: advance time {} is before its {} timestamp {}",
                    crop.id,
                    format_instant(at),
                    key.stage,
                    format_instant(entered)
                ));
            }

            crop.set_stage_at(next, Some(at));
            crop.current_stage = next;
            crop.stage_updated_at = at;
            tx.save_crop(&crop)?;
            tx.record_history(&NewHistoryEntry {
                crop_id: crop.id,
                action: HistoryAction::Advance,
                from_stage: Some(key.stage),
                to_stage: Some(next),
                occurred_at: at,
                reason: None,
            })?;
            affected_count += 1;
        }

        tx.commit()?;
        info!(batch = %key, to = %next, affected_count, "Advanced batch");

        Ok(TransitionOutcome {
            batch: key,
            from_stage: key.stage,
            to_stage: next,
            affected_count,
            warnings,
        })
    }

    /// Revert the crop's whole batch to the previous stage
    ///
    /// The current stage timestamp is cleared and `stage_updated_at` goes
    /// back to when each crop actually entered the previous stage. `reason`
    /// is only written to the history log.
    pub fn revert_stage(
        &self,
        crop_id: i64,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let tx = self.store.begin()?;
        let (key, members) = self.resolve_batch(&tx, crop_id)?;
        self.revert_in(tx, key, members, reason)
    }

    /// Revert exactly the crops in `ids`, which must all still belong to `key`
    pub fn revert_members(
        &self,
        key: &BatchKey,
        ids: &[i64],
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let tx = self.store.begin()?;
        let members = self.load_members(&tx, key, ids)?;
        self.revert_in(tx, *key, members, reason)
    }

    fn revert_in(
        &self,
        tx: StoreTx<'_>,
        key: BatchKey,
        members: Vec<Crop>,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let previous = self
            .registry
            .previous(key.stage)
            .ok_or(TransitionError::AlreadyAtFirstStage(key))?;

        let mut warnings = Vec::new();
        let mut affected_count = 0;
        for mut crop in members {
            let entered_previous = match crop.stage_at(previous) {
                Some(at) => at,
                None => {
                    warnings.push(format!(
                        "Crop {}: no {} timestamp recorded, using planting time",
                        crop.id, previous
                    ));
                    crop.planting_at
                }
            };

            crop.set_stage_at(key.stage, None);
            crop.current_stage = previous;
            crop.stage_updated_at = entered_previous;
            tx.save_crop(&crop)?;
            tx.record_history(&NewHistoryEntry {
                crop_id: crop.id,
                action: HistoryAction::Revert,
                from_stage: Some(key.stage),
                to_stage: Some(previous),
                occurred_at: Utc::now(),
                reason,
            })?;
            affected_count += 1;
        }

        tx.commit()?;
        info!(batch = %key, to = %previous, affected_count, "Reverted batch");

        Ok(TransitionOutcome {
            batch: key,
            from_stage: key.stage,
            to_stage: previous,
            affected_count,
            warnings,
        })
    }

    /// Take a single soaking crop into germination, assigning its tray
    pub fn advance_from_soaking(&self, crop_id: i64, tray: &str) -> Result<Crop, TransitionError> {
        self.advance_from_soaking_at(crop_id, tray, Utc::now())
    }

    /// [`advance_from_soaking`](Self::advance_from_soaking) with an explicit entry time
    pub fn advance_from_soaking_at(
        &self,
        crop_id: i64,
        tray: &str,
        at: DateTime<Utc>,
    ) -> Result<Crop, TransitionError> {
        let tray = tray.trim();
        if tray.is_empty() {
            return Err(TransitionError::MissingTray);
        }

        let tx = self.store.begin()?;
        let mut crop = tx
            .crop(crop_id)?
            .ok_or(TransitionError::CropNotFound(crop_id))?;

        let from = crop.current_stage;
        if !self.registry.requires_identity_assignment(from) {
            return Err(TransitionError::NotSoaking {
                crop_id,
                stage: from,
            });
        }
        if let Some(holder) = tx.tray_holder(tray, crop_id)? {
            return Err(TransitionError::TrayInUse {
                tray: tray.to_string(),
                holder,
            });
        }
        let next = self
            .registry
            .next(from)
            .ok_or(TransitionError::AlreadyHarvested(crop.batch_key()))?;

        crop.tray_number = Some(tray.to_string());
        crop.set_stage_at(next, Some(at));
        crop.current_stage = next;
        crop.stage_updated_at = at;
        tx.save_crop(&crop)?;
        tx.record_history(&NewHistoryEntry {
            crop_id,
            action: HistoryAction::ExitSoaking,
            from_stage: Some(from),
            to_stage: Some(next),
            occurred_at: at,
            reason: None,
        })?;
        tx.commit()?;

        info!(crop_id, tray, "Crop left soaking");
        Ok(crop)
    }
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
