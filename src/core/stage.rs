//! Stage registry - ordered crop stages and their thresholds
//!
//! Crops move through a fixed sequence: soaking → germination → blackout →
//! light → harvested. The order is not configurable; the per-stage
//! "extended" thresholds and the total age thresholds are.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A cultivation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Soaking,
    Germination,
    Blackout,
    Light,
    Harvested,
}

impl Stage {
    /// All stages in cultivation order
    pub const ALL: [Stage; 5] = [
        Stage::Soaking,
        Stage::Germination,
        Stage::Blackout,
        Stage::Light,
        Stage::Harvested,
    ];

    /// Stable code used in storage and on the command line
    pub fn code(&self) -> &'static str {
        match self {
            Stage::Soaking => "soaking",
            Stage::Germination => "germination",
            Stage::Blackout => "blackout",
            Stage::Light => "light",
            Stage::Harvested => "harvested",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Stage {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "soaking" => Ok(Stage::Soaking),
            "germination" => Ok(Stage::Germination),
            "blackout" => Ok(Stage::Blackout),
            "light" => Ok(Stage::Light),
            "harvested" => Ok(Stage::Harvested),
            _ => Err(StageError::UnknownStage(s.to_string())),
        }
    }
}

/// Errors raised while parsing stages or building a registry
#[derive(Debug, Error, miette::Diagnostic)]
pub enum StageError {
    #[error("Unknown stage: {0}")]
    #[diagnostic(
        code(growline::stage::unknown),
        help("valid stages are soaking, germination, blackout, light, harvested")
    )]
    UnknownStage(String),

    #[error("Invalid threshold for {stage}: {message}")]
    #[diagnostic(code(growline::stage::threshold))]
    InvalidThreshold { stage: String, message: String },
}

/// Reference data for a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    pub stage: Stage,

    /// Position in the cultivation sequence (1-based)
    pub sort_order: u32,

    /// Minutes in-stage after which the crop is flagged as extended
    pub extended_after_minutes: Option<i64>,

    pub requires_light: bool,

    pub requires_watering: bool,
}

/// Threshold overrides, keyed by stage code, read from configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StageOverride {
    pub extended_after_hours: Option<f64>,
}

/// Total age thresholds in hours, read from configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TotalAgeOverride {
    pub mature_after_hours: Option<f64>,
    pub overdue_after_hours: Option<f64>,
}

const DEFAULT_MATURE_AFTER_MINUTES: i64 = 264 * 60;
const DEFAULT_OVERDUE_AFTER_MINUTES: i64 = 336 * 60;

/// Single source of truth for stage order and thresholds
#[derive(Debug, Clone)]
pub struct StageRegistry {
    definitions: Vec<StageDefinition>,
    mature_after_minutes: i64,
    overdue_after_minutes: i64,
}

impl StageRegistry {
    /// Registry with the built-in thresholds
    pub fn new() -> Self {
        let definitions = vec![
            StageDefinition {
                stage: Stage::Soaking,
                sort_order: 1,
                extended_after_minutes: Some(24 * 60),
                requires_light: false,
                requires_watering: false,
            },
            StageDefinition {
                stage: Stage::Germination,
                sort_order: 2,
                extended_after_minutes: Some(48 * 60),
                requires_light: false,
                requires_watering: true,
            },
            StageDefinition {
                stage: Stage::Blackout,
                sort_order: 3,
                extended_after_minutes: Some(72 * 60),
                requires_light: false,
                requires_watering: true,
            },
            StageDefinition {
                stage: Stage::Light,
                sort_order: 4,
                extended_after_minutes: Some(168 * 60),
                requires_light: true,
                requires_watering: true,
            },
            StageDefinition {
                stage: Stage::Harvested,
                sort_order: 5,
                extended_after_minutes: None,
                requires_light: false,
                requires_watering: false,
            },
        ];

        Self {
            definitions,
            mature_after_minutes: DEFAULT_MATURE_AFTER_MINUTES,
            overdue_after_minutes: DEFAULT_OVERDUE_AFTER_MINUTES,
        }
    }

    /// Registry with configured threshold overrides applied on top of the defaults
    pub fn with_overrides(
        stages: &HashMap<String, StageOverride>,
        total_age: &TotalAgeOverride,
    ) -> Result<Self, StageError> {
        let mut registry = Self::new();

        for (code, stage_override) in stages {
            let stage: Stage = code.parse()?;
            if let Some(hours) = stage_override.extended_after_hours {
                let minutes = hours_to_minutes(stage.code(), hours)?;
                if let Some(def) = registry.definitions.iter_mut().find(|d| d.stage == stage) {
                    def.extended_after_minutes = Some(minutes);
                }
            }
        }

        if let Some(hours) = total_age.mature_after_hours {
            registry.mature_after_minutes = hours_to_minutes("total_age.mature", hours)?;
        }
        if let Some(hours) = total_age.overdue_after_hours {
            registry.overdue_after_minutes = hours_to_minutes("total_age.overdue", hours)?;
        }
        if registry.mature_after_minutes >= registry.overdue_after_minutes {
            return Err(StageError::InvalidThreshold {
                stage: "total_age".to_string(),
                message: "mature threshold must be below the overdue threshold".to_string(),
            });
        }

        Ok(registry)
    }

    /// All stage definitions in order
    pub fn definitions(&self) -> &[StageDefinition] {
        &self.definitions
    }

    pub fn definition(&self, stage: Stage) -> &StageDefinition {
        // Every stage has exactly one definition, in enum order
        &self.definitions[self.position(stage)]
    }

    /// Zero-based position of a stage in the sequence
    pub fn position(&self, stage: Stage) -> usize {
        self.definitions
            .iter()
            .position(|d| d.stage == stage)
            .unwrap_or_default()
    }

    /// The stage after `stage`, or `None` when `stage` is terminal
    pub fn next(&self, stage: Stage) -> Option<Stage> {
        self.definitions
            .get(self.position(stage) + 1)
            .map(|d| d.stage)
    }

    /// The stage before `stage`, or `None` when `stage` is first
    pub fn previous(&self, stage: Stage) -> Option<Stage> {
        self.position(stage)
            .checked_sub(1)
            .and_then(|idx| self.definitions.get(idx))
            .map(|d| d.stage)
    }

    pub fn is_first(&self, stage: Stage) -> bool {
        self.previous(stage).is_none()
    }

    pub fn is_terminal(&self, stage: Stage) -> bool {
        self.next(stage).is_none()
    }

    /// Whether leaving `stage` requires the caller to assign a tray identity
    pub fn requires_identity_assignment(&self, stage: Stage) -> bool {
        stage == Stage::Soaking
    }

    /// Stages strictly before `stage`, in order
    pub fn stages_before(&self, stage: Stage) -> impl Iterator<Item = Stage> + '_ {
        self.definitions[..self.position(stage)]
            .iter()
            .map(|d| d.stage)
    }

    pub fn extended_after_minutes(&self, stage: Stage) -> Option<i64> {
        self.definition(stage).extended_after_minutes
    }

    pub fn mature_after_minutes(&self) -> i64 {
        self.mature_after_minutes
    }

    pub fn overdue_after_minutes(&self) -> i64 {
        self.overdue_after_minutes
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn hours_to_minutes(label: &str, hours: f64) -> Result<i64, StageError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(StageError::InvalidThreshold {
            stage: label.to_string(),
            message: format!("expected a positive number of hours, got {}", hours),
        });
    }
    Ok((hours * 60.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let registry = StageRegistry::new();
        assert_eq!(registry.next(Stage::Soaking), Some(Stage::Germination));
        assert_eq!(registry.next(Stage::Light), Some(Stage::Harvested));
        assert_eq!(registry.next(Stage::Harvested), None);
        assert_eq!(registry.previous(Stage::Germination), Some(Stage::Soaking));
        assert_eq!(registry.previous(Stage::Soaking), None);
    }

    #[test]
    fn test_first_and_terminal() {
        let registry = StageRegistry::new();
        assert!(registry.is_first(Stage::Soaking));
        assert!(!registry.is_first(Stage::Blackout));
        assert!(registry.is_terminal(Stage::Harvested));
        assert!(!registry.is_terminal(Stage::Light));
    }

    #[test]
    fn test_only_soaking_requires_identity() {
        let registry = StageRegistry::new();
        for stage in Stage::ALL {
            assert_eq!(
                registry.requires_identity_assignment(stage),
                stage == Stage::Soaking
            );
        }
    }

    #[test]
    fn test_default_thresholds() {
        let registry = StageRegistry::new();
        assert_eq!(registry.extended_after_minutes(Stage::Germination), Some(2880));
        assert_eq!(registry.extended_after_minutes(Stage::Blackout), Some(4320));
        assert_eq!(registry.extended_after_minutes(Stage::Light), Some(10080));
        assert_eq!(registry.extended_after_minutes(Stage::Harvested), None);
        assert_eq!(registry.mature_after_minutes(), 15840);
        assert_eq!(registry.overdue_after_minutes(), 20160);
    }

    #[test]
    fn test_stages_before() {
        let registry = StageRegistry::new();
        let before: Vec<_> = registry.stages_before(Stage::Blackout).collect();
        assert_eq!(before, vec![Stage::Soaking, Stage::Germination]);
        assert_eq!(registry.stages_before(Stage::Soaking).count(), 0);
    }

    #[test]
    fn test_overrides_apply() {
        let mut stages = HashMap::new();
        stages.insert(
            "blackout".to_string(),
            StageOverride {
                extended_after_hours: Some(96.0),
            },
        );
        let registry = StageRegistry::with_overrides(&stages, &TotalAgeOverride::default()).unwrap();
        assert_eq!(registry.extended_after_minutes(Stage::Blackout), Some(96 * 60));
        assert_eq!(registry.extended_after_minutes(Stage::Light), Some(168 * 60));
    }

    #[test]
    fn test_overrides_reject_unknown_stage() {
        let mut stages = HashMap::new();
        stages.insert("sprouting".to_string(), StageOverride::default());
        let result = StageRegistry::with_overrides(&stages, &TotalAgeOverride::default());
        assert!(matches!(result, Err(StageError::UnknownStage(_))));
    }

    #[test]
    fn test_overrides_reject_inverted_total_age() {
        let total_age = TotalAgeOverride {
            mature_after_hours: Some(400.0),
            overdue_after_hours: None,
        };
        let result = StageRegistry::with_overrides(&HashMap::new(), &total_age);
        assert!(matches!(result, Err(StageError::InvalidThreshold { .. })));
    }

    #[test]
    fn test_stage_parse_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(stage.code().parse::<Stage>().unwrap(), stage);
        }
        assert!("sprouting".parse::<Stage>().is_err());
    }
}
