//! Stage clock - time-derived crop status
//!
//! Everything here is a pure function of a crop's stored timestamps, its
//! recipe and the instant `now`. Results are recomputed on every read and
//! never persisted, since they go stale as soon as `now` moves.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::stage::{Stage, StageRegistry};
use crate::entities::{Crop, Recipe};

const OVERDUE_AFTER_MINUTES: i64 = -1440;
const UPCOMING_WITHIN_MINUTES: i64 = 360;

/// Whether the crop has been in its stage longer than expected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAgeStatus {
    Normal,
    Extended,
}

/// How close the crop is to its projected next transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStageStatus {
    Overdue,
    DueNow,
    Upcoming,
    OnTrack,
}

/// Classification of total time since planting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalAgeStatus {
    Growing,
    Mature,
    Overdue,
}

impl std::fmt::Display for StageAgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageAgeStatus::Normal => write!(f, "normal"),
            StageAgeStatus::Extended => write!(f, "extended"),
        }
    }
}

impl std::fmt::Display for NextStageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextStageStatus::Overdue => write!(f, "overdue"),
            NextStageStatus::DueNow => write!(f, "due_now"),
            NextStageStatus::Upcoming => write!(f, "upcoming"),
            NextStageStatus::OnTrack => write!(f, "on_track"),
        }
    }
}

impl std::fmt::Display for TotalAgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TotalAgeStatus::Growing => write!(f, "growing"),
            TotalAgeStatus::Mature => write!(f, "mature"),
            TotalAgeStatus::Overdue => write!(f, "overdue"),
        }
    }
}

/// Derived status of a crop at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CropStatus {
    pub stage_age_minutes: i64,
    pub stage_age_status: StageAgeStatus,
    pub time_to_next_stage_minutes: Option<i64>,
    pub time_to_next_stage_status: Option<NextStageStatus>,
    pub total_age_minutes: i64,
    pub total_age_status: TotalAgeStatus,
}

/// Computes [`CropStatus`] against a stage registry
#[derive(Debug, Clone, Copy)]
pub struct StageClock<'a> {
    registry: &'a StageRegistry,
}

impl<'a> StageClock<'a> {
    pub fn new(registry: &'a StageRegistry) -> Self {
        Self { registry }
    }

    /// Compute every derived status field for `crop` at `now`
    pub fn compute_status(&self, crop: &Crop, recipe: &Recipe, now: DateTime<Utc>) -> CropStatus {
        let stage_age_minutes = (now - crop.stage_updated_at).num_minutes();
        let stage_age_status = match self.registry.extended_after_minutes(crop.current_stage) {
            Some(threshold) if stage_age_minutes > threshold => StageAgeStatus::Extended,
            _ => StageAgeStatus::Normal,
        };

        let time_to_next_stage_minutes = self
            .projected_next_stage_at(crop, recipe)
            .map(|at| (at - now).num_minutes());
        let time_to_next_stage_status = time_to_next_stage_minutes.map(classify_time_to_next);

        let total_age_minutes = (now - crop.planting_at).num_minutes();
        let total_age_status = if total_age_minutes > self.registry.overdue_after_minutes() {
            TotalAgeStatus::Overdue
        } else if total_age_minutes > self.registry.mature_after_minutes() {
            TotalAgeStatus::Mature
        } else {
            TotalAgeStatus::Growing
        };

        CropStatus {
            stage_age_minutes,
            stage_age_status,
            time_to_next_stage_minutes,
            time_to_next_stage_status,
            total_age_minutes,
            total_age_status,
        }
    }

    /// When the crop is expected to leave its current stage
    ///
    /// `planting_at` plus the configured durations of every stage up to and
    /// including the current one. Soaking counts as zero for later stages
    /// when the recipe has no soak time. `None` for harvested crops, when a
    /// required duration is missing, or when the projection is out of range.
    pub fn projected_next_stage_at(&self, crop: &Crop, recipe: &Recipe) -> Option<DateTime<Utc>> {
        let current = crop.current_stage;
        if self.registry.is_terminal(current) {
            return None;
        }

        let mut offset = Duration::zero();
        for stage in self.registry.stages_before(current) {
            match recipe.stage_duration(stage) {
                Some(duration) => offset = offset.checked_add(&duration)?,
                None if stage == Stage::Soaking => {}
                None => return None,
            }
        }
        offset = offset.checked_add(&recipe.stage_duration(current)?)?;

        crop.planting_at.checked_add_signed(offset)
    }
}

/// Bucket minutes-until-next-stage into a status
pub fn classify_time_to_next(minutes: i64) -> NextStageStatus {
    if minutes < OVERDUE_AFTER_MINUTES {
        NextStageStatus::Overdue
    } else if minutes < 0 {
        NextStageStatus::DueNow
    } else if minutes < UPCOMING_WITHIN_MINUTES {
        NextStageStatus::Upcoming
    } else {
        NextStageStatus::OnTrack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn recipe() -> Recipe {
        Recipe {
            id: 1,
            name: "Sunflower".to_string(),
            germination_days: Some(3.0),
            blackout_days: Some(2.0),
            light_days: Some(7.0),
            seed_soak_hours: None,
            days_to_maturity: None,
            buffer_percentage: 0.0,
        }
    }

    fn germinating_crop() -> Crop {
        Crop {
            id: 1,
            recipe_id: 1,
            tray_number: Some("T1".to_string()),
            current_stage: Stage::Germination,
            planting_at: t0(),
            stage_updated_at: t0(),
            soaking_at: Some(t0()),
            germination_at: Some(t0()),
            blackout_at: None,
            light_at: None,
            harvested_at: None,
            watering_suspended_at: None,
        }
    }

    #[test]
    fn test_time_to_next_stage_boundaries() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let crop = germinating_crop();
        let boundary = t0() + Duration::hours(72);

        let status = clock.compute_status(&crop, &recipe(), t0() + Duration::hours(50));
        assert_eq!(status.time_to_next_stage_minutes, Some(1320));
        assert_eq!(status.time_to_next_stage_status, Some(NextStageStatus::OnTrack));

        let status = clock.compute_status(&crop, &recipe(), boundary + Duration::hours(25));
        assert_eq!(status.time_to_next_stage_minutes, Some(-1500));
        assert_eq!(status.time_to_next_stage_status, Some(NextStageStatus::Overdue));

        let status = clock.compute_status(&crop, &recipe(), boundary - Duration::hours(5));
        assert_eq!(status.time_to_next_stage_minutes, Some(300));
        assert_eq!(status.time_to_next_stage_status, Some(NextStageStatus::Upcoming));

        let status = clock.compute_status(&crop, &recipe(), boundary + Duration::minutes(10));
        assert_eq!(status.time_to_next_stage_minutes, Some(-10));
        assert_eq!(status.time_to_next_stage_status, Some(NextStageStatus::DueNow));
    }

    #[test]
    fn test_classification_edges() {
        assert_eq!(classify_time_to_next(-1441), NextStageStatus::Overdue);
        assert_eq!(classify_time_to_next(-1440), NextStageStatus::DueNow);
        assert_eq!(classify_time_to_next(-1), NextStageStatus::DueNow);
        assert_eq!(classify_time_to_next(0), NextStageStatus::Upcoming);
        assert_eq!(classify_time_to_next(359), NextStageStatus::Upcoming);
        assert_eq!(classify_time_to_next(360), NextStageStatus::OnTrack);
    }

    #[test]
    fn test_projection_accumulates_earlier_stages() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let mut crop = germinating_crop();
        crop.current_stage = Stage::Light;

        // 3 + 2 + 7 days
        assert_eq!(
            clock.projected_next_stage_at(&crop, &recipe()),
            Some(t0() + Duration::days(12))
        );

        let mut soaked = recipe();
        soaked.seed_soak_hours = Some(12.0);
        assert_eq!(
            clock.projected_next_stage_at(&crop, &soaked),
            Some(t0() + Duration::days(12) + Duration::hours(12))
        );
    }

    #[test]
    fn test_projection_missing_inputs() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let mut crop = germinating_crop();
        crop.current_stage = Stage::Light;

        let mut partial = recipe();
        partial.blackout_days = None;
        assert_eq!(clock.projected_next_stage_at(&crop, &partial), None);

        crop.current_stage = Stage::Soaking;
        assert_eq!(clock.projected_next_stage_at(&crop, &recipe()), None);

        crop.current_stage = Stage::Harvested;
        let status = clock.compute_status(&crop, &recipe(), t0());
        assert_eq!(status.time_to_next_stage_minutes, None);
        assert_eq!(status.time_to_next_stage_status, None);
    }

    #[test]
    fn test_stage_age_extended() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let crop = germinating_crop();

        let status = clock.compute_status(&crop, &recipe(), t0() + Duration::hours(48));
        assert_eq!(status.stage_age_minutes, 2880);
        assert_eq!(status.stage_age_status, StageAgeStatus::Normal);

        let status = clock.compute_status(&crop, &recipe(), t0() + Duration::minutes(2881));
        assert_eq!(status.stage_age_status, StageAgeStatus::Extended);
    }

    #[test]
    fn test_harvested_never_extended() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let mut crop = germinating_crop();
        crop.current_stage = Stage::Harvested;

        let status = clock.compute_status(&crop, &recipe(), t0() + Duration::days(60));
        assert_eq!(status.stage_age_status, StageAgeStatus::Normal);
    }

    #[test]
    fn test_total_age_thresholds() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let crop = germinating_crop();

        let at = |minutes| clock.compute_status(&crop, &recipe(), t0() + Duration::minutes(minutes));
        assert_eq!(at(15840).total_age_status, TotalAgeStatus::Growing);
        assert_eq!(at(15841).total_age_status, TotalAgeStatus::Mature);
        assert_eq!(at(20160).total_age_status, TotalAgeStatus::Mature);
        assert_eq!(at(20161).total_age_status, TotalAgeStatus::Overdue);
        assert_eq!(at(20161).total_age_minutes, 20161);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let status = clock.compute_status(
            &germinating_crop(),
            &recipe(),
            t0() + Duration::hours(72) + Duration::minutes(10),
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["time_to_next_stage_status"], "due_now");
        assert_eq!(json["stage_age_status"], "extended");
        assert_eq!(NextStageStatus::OnTrack.to_string(), "on_track");
    }

    #[test]
    fn test_out_of_range_recipe_has_no_projection() {
        let registry = StageRegistry::new();
        let clock = StageClock::new(&registry);
        let crop = germinating_crop();

        let mut huge = recipe();
        huge.germination_days = Some(1e300);
        let status = clock.compute_status(&crop, &huge, t0() + Duration::hours(1));
        assert_eq!(status.time_to_next_stage_minutes, None);
        assert_eq!(status.time_to_next_stage_status, None);
        assert_eq!(status.stage_age_minutes, 60);

        huge.germination_days = Some(1e9);
        assert_eq!(clock.projected_next_stage_at(&crop, &huge), None);
    }
}
