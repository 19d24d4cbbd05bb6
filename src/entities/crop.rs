//! Crop entity type - one physical tray tracked through the stage lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::stage::Stage;

/// A single production unit ("crop")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub id: i64,

    pub recipe_id: i64,

    /// Tray identifier, absent while the crop is soaking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tray_number: Option<String>,

    pub current_stage: Stage,

    /// When the crop entered active cultivation
    pub planting_at: DateTime<Utc>,

    /// When the crop entered its current stage
    pub stage_updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soaking_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub germination_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackout_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvested_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watering_suspended_at: Option<DateTime<Utc>>,
}

impl Crop {
    /// Recorded entry instant for a stage
    pub fn stage_at(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Soaking => self.soaking_at,
            Stage::Germination => self.germination_at,
            Stage::Blackout => self.blackout_at,
            Stage::Light => self.light_at,
            Stage::Harvested => self.harvested_at,
        }
    }

    /// Set (or clear) the entry instant for a stage
    pub fn set_stage_at(&mut self, stage: Stage, at: Option<DateTime<Utc>>) {
        let slot = match stage {
            Stage::Soaking => &mut self.soaking_at,
            Stage::Germination => &mut self.germination_at,
            Stage::Blackout => &mut self.blackout_at,
            Stage::Light => &mut self.light_at,
            Stage::Harvested => &mut self.harvested_at,
        };
        *slot = at;
    }

    /// The latest stage, in stage order, that has a recorded timestamp
    pub fn latest_recorded_stage(&self) -> Option<Stage> {
        Stage::ALL
            .iter()
            .rev()
            .copied()
            .find(|stage| self.stage_at(*stage).is_some())
    }

    pub fn is_harvested(&self) -> bool {
        self.current_stage == Stage::Harvested
    }

    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            recipe_id: self.recipe_id,
            planting_date: self.planting_at.date_naive(),
            stage: self.current_stage,
        }
    }
}

/// Identity of a batch: every crop sharing recipe, planting date and stage
///
/// Batches are derived, never stored; membership changes whenever a crop's
/// stage changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey {
    pub recipe_id: i64,
    pub planting_date: NaiveDate,
    pub stage: Stage,
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "recipe {} planted {} ({})",
            self.recipe_id, self.planting_date, self.stage
        )
    }
}

/// Summary of an active batch for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub key: BatchKey,
    pub recipe_name: String,
    pub crop_ids: Vec<i64>,
    pub tray_numbers: Vec<String>,
    pub stage_updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn crop_count(&self) -> usize {
        self.crop_ids.len()
    }

    /// Member used to address the batch
    pub fn representative(&self) -> Option<i64> {
        self.crop_ids.first().copied()
    }
}
