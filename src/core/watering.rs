//! Watering suspension for light-stage batches
//!
//! Suspending watering stamps every member of the batch and tells the task
//! scheduler to stand down any pending automatic suspension for those crops.
//! The scheduler signal is best effort: it runs after the batch commits and
//! a failure there is logged, not returned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::stage::Stage;
use crate::core::store::{HistoryAction, NewHistoryEntry};
use crate::core::transition::{TransitionEngine, TransitionError};

/// Kind of scheduled per-crop task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SuspendWatering,
}

impl TaskType {
    pub fn code(&self) -> &'static str {
        match self {
            TaskType::SuspendWatering => "suspend_watering",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "suspend_watering" => Ok(TaskType::SuspendWatering),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

#[derive(Debug, Error)]
#[error("Scheduler error: {0}")]
pub struct SchedulerError(pub String);

/// Receives deactivation signals for scheduled tasks
pub trait TaskScheduler {
    /// Deactivate pending tasks of `task_type` for a crop; returns how many were active
    fn deactivate(&self, crop_id: i64, task_type: TaskType) -> Result<usize, SchedulerError>;
}

/// Batch-wide watering suspension
pub struct WateringSuspension<'a> {
    engine: TransitionEngine<'a>,
    scheduler: &'a dyn TaskScheduler,
}

impl<'a> WateringSuspension<'a> {
    pub fn new(engine: TransitionEngine<'a>, scheduler: &'a dyn TaskScheduler) -> Self {
        Self { engine, scheduler }
    }

    /// Suspend watering for the batch `crop_id` belongs to
    ///
    /// The batch must be in the light stage and the referenced crop must not
    /// already be suspended. Members that were suspended earlier keep their
    /// original instant. Returns the number of crops updated.
    pub fn suspend_watering(
        &self,
        crop_id: i64,
        at: DateTime<Utc>,
    ) -> Result<usize, TransitionError> {
        let tx = self.engine.store().begin()?;
        let (key, members) = self.engine.resolve_batch(&tx, crop_id)?;

        if key.stage != Stage::Light {
            return Err(TransitionError::WateringWrongStage { stage: key.stage });
        }
        if members
            .iter()
            .any(|crop| crop.id == crop_id && crop.watering_suspended_at.is_some())
        {
            return Err(TransitionError::WateringAlreadySuspended { crop_id });
        }

        let mut updated = Vec::new();
        for mut crop in members {
            if crop.watering_suspended_at.is_some() {
                continue;
            }
            crop.watering_suspended_at = Some(at);
            tx.save_crop(&crop)?;
            tx.record_history(&NewHistoryEntry {
                crop_id: crop.id,
                action: HistoryAction::SuspendWatering,
                from_stage: Some(key.stage),
                to_stage: Some(key.stage),
                occurred_at: at,
                reason: None,
            })?;
            updated.push(crop.id);
        }
        tx.commit()?;
        info!(batch = %key, affected_count = updated.len(), "Suspended watering");

        for id in &updated {
            if let Err(err) = self.scheduler.deactivate(*id, TaskType::SuspendWatering) {
                warn!(crop_id = id, error = %err, "Failed to deactivate scheduled task");
            }
        }

        Ok(updated.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::{exit_soaking_all, planted_store, t0};
    use crate::core::stage::StageRegistry;
    use chrono::Duration;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingScheduler {
        calls: RefCell<Vec<(i64, TaskType)>>,
        fail: bool,
    }

    impl TaskScheduler for RecordingScheduler {
        fn deactivate(&self, crop_id: i64, task_type: TaskType) -> Result<usize, SchedulerError> {
            self.calls.borrow_mut().push((crop_id, task_type));
            if self.fail {
                return Err(SchedulerError("offline".to_string()));
            }
            Ok(1)
        }
    }

    fn light_batch(
        count: u32,
    ) -> (crate::core::store::CropStore, Vec<crate::entities::Crop>) {
        let (store, _recipe, crops) = planted_store(count);
        {
            let registry = StageRegistry::new();
            let engine = TransitionEngine::new(&store, &registry);
            exit_soaking_all(&engine, &crops, t0());
            engine
                .advance_stage(crops[0].id, t0() + Duration::days(3))
                .unwrap();
            engine
                .advance_stage(crops[0].id, t0() + Duration::days(5))
                .unwrap();
        }
        (store, crops)
    }

    #[test]
    fn test_task_type_codes() {
        assert_eq!(TaskType::SuspendWatering.to_string(), "suspend_watering");
        assert_eq!(
            "suspend-watering".parse::<TaskType>().unwrap(),
            TaskType::SuspendWatering
        );
        assert!("water".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_suspend_light_batch() {
        let (store, crops) = light_batch(3);
        let registry = StageRegistry::new();
        let engine = TransitionEngine::new(&store, &registry);
        let scheduler = RecordingScheduler::default();
        let watering = WateringSuspension::new(engine, &scheduler);

        let at = t0() + Duration::days(10);
        assert_eq!(watering.suspend_watering(crops[1].id, at).unwrap(), 3);

        for crop in &crops {
            let crop = store.crop(crop.id).unwrap().unwrap();
            assert_eq!(crop.watering_suspended_at, Some(at));
            assert_eq!(crop.current_stage, Stage::Light);
        }
        let calls = scheduler.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, t)| *t == TaskType::SuspendWatering));
    }

    #[test]
    fn test_suspend_rejects_other_stages() {
        let (store, _recipe, crops) = planted_store(1);
        let registry = StageRegistry::new();
        let engine = TransitionEngine::new(&store, &registry);
        exit_soaking_all(&engine, &crops, t0());
        let scheduler = RecordingScheduler::default();
        let watering = WateringSuspension::new(engine, &scheduler);

        let err = watering.suspend_watering(crops[0].id, t0()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::WateringWrongStage {
                stage: Stage::Germination
            }
        ));
        assert!(err.is_validation());
        assert!(scheduler.calls.borrow().is_empty());
    }

    #[test]
    fn test_suspend_twice_fails() {
        let (store, crops) = light_batch(2);
        let registry = StageRegistry::new();
        let engine = TransitionEngine::new(&store, &registry);
        let scheduler = RecordingScheduler::default();
        let watering = WateringSuspension::new(engine, &scheduler);

        watering.suspend_watering(crops[0].id, t0()).unwrap();
        let err = watering.suspend_watering(crops[0].id, t0()).unwrap_err();
        assert!(matches!(err, TransitionError::WateringAlreadySuspended { .. }));
    }

    #[test]
    fn test_scheduler_failure_does_not_fail_suspension() {
        let (store, crops) = light_batch(2);
        let registry = StageRegistry::new();
        let engine = TransitionEngine::new(&store, &registry);
        let scheduler = RecordingScheduler {
            fail: true,
            ..Default::default()
        };
        let watering = WateringSuspension::new(engine, &scheduler);

        assert_eq!(watering.suspend_watering(crops[0].id, t0()).unwrap(), 2);
        assert!(store
            .crop(crops[0].id)
            .unwrap()
            .unwrap()
            .watering_suspended_at
            .is_some());
    }

    #[test]
    fn test_store_scheduler_deactivates_tasks() {
        let (store, crops) = light_batch(1);
        store
            .schedule_task(crops[0].id, TaskType::SuspendWatering, t0() + Duration::days(11))
            .unwrap();
        let registry = StageRegistry::new();
        let engine = TransitionEngine::new(&store, &registry);
        let watering = WateringSuspension::new(engine, &store);

        watering.suspend_watering(crops[0].id, t0()).unwrap();
        assert!(store.tasks(true).unwrap().is_empty());
        assert_eq!(store.tasks(false).unwrap().len(), 1);
    }
}
