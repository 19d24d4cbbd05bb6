//! Core module - stage lifecycle engine and infrastructure

pub mod bulk;
pub mod clock;
pub mod config;
pub mod project;
pub mod repair;
pub mod stage;
pub mod store;
pub mod transition;
pub mod watering;

#[cfg(test)]
mod fixtures;

pub use bulk::{BatchFailure, BatchOperationCoordinator, BulkAdvanceReport, BulkRevertReport, WarningLog};
pub use clock::{CropStatus, NextStageStatus, StageAgeStatus, StageClock, TotalAgeStatus};
pub use config::Config;
pub use project::{Project, ProjectError};
pub use repair::{
    detect_issues, fix_missing_stage_timestamps, ConsistencyIssue, ConsistencyRepair, RepairReport,
};
pub use stage::{Stage, StageDefinition, StageError, StageRegistry};
pub use store::{
    CropFilter, CropStore, HistoryAction, HistoryEntry, ScheduledTask, StoreError, StoreTx,
};
pub use transition::{ErrorKind, Transition, TransitionEngine, TransitionError, TransitionOutcome};
pub use watering::{SchedulerError, TaskScheduler, TaskType, WateringSuspension};
