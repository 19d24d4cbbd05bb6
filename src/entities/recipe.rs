//! Recipe entity type - per-stage growing durations

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::stage::Stage;

/// A growing recipe
///
/// Recipes are read-only inputs to the lifecycle engine: they supply the
/// expected duration of each stage so status can be projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub germination_days: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackout_days: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_days: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_soak_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_maturity: Option<f64>,

    /// Planning buffer applied when working back from a harvest date
    #[serde(default)]
    pub buffer_percentage: f64,
}

/// Fields for a recipe that has not been stored yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub germination_days: Option<f64>,
    pub blackout_days: Option<f64>,
    pub light_days: Option<f64>,
    pub seed_soak_hours: Option<f64>,
    pub days_to_maturity: Option<f64>,
    pub buffer_percentage: f64,
}

impl Recipe {
    /// Configured duration of a stage, if the recipe defines one
    ///
    /// Soaking is configured in hours, the growing stages in days. The
    /// harvested stage has no duration.
    pub fn stage_duration(&self, stage: Stage) -> Option<Duration> {
        let minutes = match stage {
            Stage::Soaking => self.seed_soak_hours.map(|h| h * 60.0),
            Stage::Germination => self.germination_days.map(days_to_minutes),
            Stage::Blackout => self.blackout_days.map(days_to_minutes),
            Stage::Light => self.light_days.map(days_to_minutes),
            Stage::Harvested => None,
        }?;

        minutes_to_duration(minutes)
    }

    /// Days from planting to harvest
    ///
    /// Uses the sum of stage durations when all are configured, falling back to
    /// `days_to_maturity`.
    pub fn total_growth_days(&self) -> Option<f64> {
        match (self.germination_days, self.blackout_days, self.light_days) {
            (Some(g), Some(b), Some(l)) => Some(g + b + l),
            _ => self.days_to_maturity,
        }
    }

    /// Expected harvest instant for a crop planted at `planting_at`
    pub fn expected_harvest_at(&self, planting_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let growth = minutes_to_duration(days_to_minutes(self.total_growth_days()?))?;
        planting_at
            .checked_add_signed(self.soak_or_zero())?
            .checked_add_signed(growth)
    }

    /// Latest planting instant that still meets `harvest_at`, with the buffer applied
    pub fn latest_planting_for(&self, harvest_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.total_growth_days()?;
        let buffered = days * (1.0 + self.buffer_percentage.max(0.0) / 100.0);
        let growth = minutes_to_duration(days_to_minutes(buffered))?;
        harvest_at
            .checked_sub_signed(self.soak_or_zero())?
            .checked_sub_signed(growth)
    }

    fn soak_or_zero(&self) -> Duration {
        self.stage_duration(Stage::Soaking).unwrap_or_else(Duration::zero)
    }
}

fn days_to_minutes(days: f64) -> f64 {
    days * 24.0 * 60.0
}

/// `None` for negative, non-finite or out-of-range values
fn minutes_to_duration(minutes: f64) -> Option<Duration> {
    if !minutes.is_finite() || minutes < 0.0 || minutes >= i64::MAX as f64 {
        return None;
    }
    Duration::try_minutes(minutes.round() as i64)
}
