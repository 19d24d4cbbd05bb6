//! Consistency repair - detect and backfill missing stage timestamps
//!
//! A crop's stage timestamps should form an unbroken, non-decreasing chain
//! up to its current stage. Gaps come from data entry, not from skipped
//! stages, so they are filled with a plausible instant inferred from the
//! neighbouring timestamps and the recipe's stage durations.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::stage::{Stage, StageRegistry};
use crate::core::store::{CropFilter, CropStore, HistoryAction, NewHistoryEntry, StoreError};
use crate::entities::{Crop, Recipe};

/// A problem found in a crop's stage timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// A stage at or before the current one has no timestamp
    MissingTimestamp { stage: Stage },
    /// A later stage was entered before an earlier one
    OutOfOrder { earlier: Stage, later: Stage },
    /// The current stage is not the latest stage with a timestamp
    StageMismatch {
        current: Stage,
        latest_recorded: Option<Stage>,
    },
}

impl std::fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyIssue::MissingTimestamp { stage } => {
                write!(f, "missing {} timestamp", stage)
            }
            ConsistencyIssue::OutOfOrder { earlier, later } => {
                write!(f, "{} timestamp is before {} timestamp", later, earlier)
            }
            ConsistencyIssue::StageMismatch {
                current,
                latest_recorded: Some(latest),
            } => write!(f, "current stage is {} but latest timestamp is {}", current, latest),
            ConsistencyIssue::StageMismatch {
                current,
                latest_recorded: None,
            } => write!(f, "current stage is {} but no timestamps are recorded", current),
        }
    }
}

/// Inspect a crop's timestamp chain without changing it
pub fn detect_issues(crop: &Crop, registry: &StageRegistry) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();
    let current_pos = registry.position(crop.current_stage);

    for def in &registry.definitions()[..=current_pos] {
        if crop.stage_at(def.stage).is_none() {
            issues.push(ConsistencyIssue::MissingTimestamp { stage: def.stage });
        }
    }

    let recorded: Vec<(Stage, DateTime<Utc>)> = registry
        .definitions()
        .iter()
        .filter_map(|def| crop.stage_at(def.stage).map(|at| (def.stage, at)))
        .collect();
    for pair in recorded.windows(2) {
        let ((earlier, earlier_at), (later, later_at)) = (pair[0], pair[1]);
        if later_at < earlier_at {
            issues.push(ConsistencyIssue::OutOfOrder { earlier, later });
        }
    }

    let latest_recorded = crop.latest_recorded_stage();
    if latest_recorded != Some(crop.current_stage) {
        issues.push(ConsistencyIssue::StageMismatch {
            current: crop.current_stage,
            latest_recorded,
        });
    }

    issues
}

/// Backfill missing timestamps for every stage up to and including the current one
///
/// Earlier stages are inferred from their neighbours. The current stage's
/// own slot is written too when empty, using `stage_updated_at`, so callers
/// should expect that field to change as well.
///
/// Returns `true` if any field changed. Running it again on a repaired crop
/// changes nothing and returns `false`. Only gaps are filled: recorded
/// timestamps are never moved, so a chain that was already out of order
/// stays that way and is still reported by [`detect_issues`].
pub fn fix_missing_stage_timestamps(
    crop: &mut Crop,
    recipe: &Recipe,
    registry: &StageRegistry,
) -> bool {
    let current_pos = registry.position(crop.current_stage);
    let chain: Vec<Stage> = registry.definitions()[..=current_pos]
        .iter()
        .map(|def| def.stage)
        .collect();
    let mut changed = false;

    // The current stage was entered when the crop last changed stage
    if crop.stage_at(crop.current_stage).is_none() {
        crop.set_stage_at(crop.current_stage, Some(crop.stage_updated_at));
        changed = true;
    }

    for idx in 0..chain.len() {
        let stage = chain[idx];
        if crop.stage_at(stage).is_some() {
            continue;
        }
        let inferred = infer_stage_at(crop, recipe, &chain, idx);
        debug!(crop_id = crop.id, %stage, at = %inferred, "Backfilling stage timestamp");
        crop.set_stage_at(stage, Some(inferred));
        changed = true;
    }

    changed
}

/// Plausible entry instant for `chain[idx]`
///
/// Earlier stages are always filled before later ones, so `chain[idx - 1]`
/// has a timestamp. Works forward from it using that stage's duration, or
/// back from the next recorded stage when the duration is unknown, and
/// clamps between the two neighbours. When the next recorded stamp is
/// itself before the previous one no value fits; the previous stamp wins.
fn infer_stage_at(crop: &Crop, recipe: &Recipe, chain: &[Stage], idx: usize) -> DateTime<Utc> {
    let next_recorded = chain[idx + 1..]
        .iter()
        .enumerate()
        .find_map(|(offset, stage)| crop.stage_at(*stage).map(|at| (idx + 1 + offset, at)));

    let previous = idx
        .checked_sub(1)
        .and_then(|p| crop.stage_at(chain[p]).map(|at| (chain[p], at)));

    let Some((previous_stage, previous_at)) = previous else {
        // Soaking starts at planting
        return match next_recorded {
            Some((_, upper)) => crop.planting_at.min(upper),
            None => crop.planting_at,
        };
    };

    let forward = recipe
        .stage_duration(previous_stage)
        .and_then(|duration| previous_at.checked_add_signed(duration));
    let backward = next_recorded.and_then(|(next_idx, next_at)| {
        chain[idx..next_idx]
            .iter()
            .try_fold(Duration::zero(), |acc, stage| {
                acc.checked_add(&recipe.stage_duration(*stage)?)
            })
            .and_then(|span| next_at.checked_sub_signed(span))
    });

    let candidate = forward.or(backward).unwrap_or(previous_at);
    let upper = next_recorded.map(|(_, at)| at).unwrap_or(candidate);
    candidate.min(upper).max(previous_at)
}

/// Result of repairing many crops
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub inspected: usize,
    pub repaired: Vec<i64>,
    /// Issues that remain after backfilling, by crop
    pub unresolved: Vec<(i64, Vec<ConsistencyIssue>)>,
}

/// Store-level repair: loads crops, fixes them and writes changes atomically
pub struct ConsistencyRepair<'a> {
    store: &'a CropStore,
    registry: &'a StageRegistry,
}

impl<'a> ConsistencyRepair<'a> {
    pub fn new(store: &'a CropStore, registry: &'a StageRegistry) -> Self {
        Self { store, registry }
    }

    /// Repair a single crop; returns whether anything was written
    pub fn repair_crop(&self, crop_id: i64) -> Result<bool, StoreError> {
        let tx = self.store.begin()?;
        let mut crop = tx.crop(crop_id)?.ok_or(StoreError::CropNotFound(crop_id))?;
        let recipe = tx
            .recipe(crop.recipe_id)?
            .ok_or(StoreError::RecipeNotFound(crop.recipe_id))?;

        if !fix_missing_stage_timestamps(&mut crop, &recipe, self.registry) {
            return Ok(false);
        }

        tx.save_crop(&crop)?;
        tx.record_history(&repair_entry(&crop))?;
        tx.commit()?;
        info!(crop_id, "Repaired stage timestamps");
        Ok(true)
    }

    /// Repair every crop in one transaction
    ///
    /// With `dry_run` nothing is written; the report lists what would change.
    pub fn repair_all(&self, dry_run: bool) -> Result<RepairReport, StoreError> {
        let filter = CropFilter {
            include_harvested: true,
            ..CropFilter::default()
        };
        let crops = self.store.crops(&filter)?;
        let tx = self.store.begin()?;
        let mut report = RepairReport::default();

        for mut crop in crops {
            report.inspected += 1;
            let recipe = tx
                .recipe(crop.recipe_id)?
                .ok_or(StoreError::RecipeNotFound(crop.recipe_id))?;

            if fix_missing_stage_timestamps(&mut crop, &recipe, self.registry) {
                report.repaired.push(crop.id);
                if !dry_run {
                    tx.save_crop(&crop)?;
                    tx.record_history(&repair_entry(&crop))?;
                }
            }

            let remaining = detect_issues(&crop, self.registry);
            if !remaining.is_empty() {
                report.unresolved.push((crop.id, remaining));
            }
        }

        if !dry_run {
            tx.commit()?;
        }
        info!(
            inspected = report.inspected,
            repaired = report.repaired.len(),
            dry_run,
            "Repair finished"
        );
        Ok(report)
    }
}

fn repair_entry(crop: &Crop) -> NewHistoryEntry<'static> {
    NewHistoryEntry {
        crop_id: crop.id,
        action: HistoryAction::Repair,
        from_stage: None,
        to_stage: Some(crop.current_stage),
        occurred_at: Utc::now(),
        reason: Some("backfilled missing stage timestamps"),
    }
}
