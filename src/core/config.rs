//! Layered configuration
//!
//! Sources, lowest precedence first: built-in defaults, the user config file,
//! the project's `.growline/config.yaml`, then the `GROWLINE_DB` environment
//! variable. Unreadable or invalid files are skipped with a warning.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::project::Project;
use crate::core::stage::{StageError, StageOverride, StageRegistry, TotalAgeOverride};

/// Environment variable overriding the database path
pub const DB_ENV: &str = "GROWLINE_DB";

const DEFAULT_WARNING_DISPLAY_LIMIT: usize = 5;

/// Effective configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-stage threshold overrides keyed by stage code
    pub stages: HashMap<String, StageOverride>,
    pub total_age: TotalAgeOverride,
    /// Warnings shown before collapsing into "...and K more"
    pub warning_display_limit: usize,
    /// Explicit database path
    pub database: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stages: HashMap::new(),
            total_age: TotalAgeOverride::default(),
            warning_display_limit: DEFAULT_WARNING_DISPLAY_LIMIT,
            database: None,
        }
    }
}

/// One config file; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    stages: HashMap<String, StageOverride>,
    total_age: TotalAgeOverride,
    warning_display_limit: Option<usize>,
    database: Option<PathBuf>,
}

impl Config {
    /// Load configuration for the project containing the current directory
    pub fn load() -> Self {
        let project = Project::discover().ok();
        Self::load_for(project.as_ref())
    }

    /// Load configuration for a specific project (or none)
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Self::default();

        if let Some(path) = user_config_path() {
            config.merge_file(&path);
        }
        if let Some(project) = project {
            config.merge_file(&project.config_path());
        }
        if let Ok(db) = std::env::var(DB_ENV) {
            if !db.trim().is_empty() {
                config.database = Some(PathBuf::from(db));
            }
        }

        config
    }

    fn merge_file(&mut self, path: &Path) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return;
        };
        match serde_yml::from_str::<Option<ConfigFile>>(&contents) {
            Ok(Some(file)) => self.merge(file),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Ignoring invalid config file"),
        }
    }

    fn merge(&mut self, file: ConfigFile) {
        for (code, stage) in file.stages {
            let entry = self.stages.entry(code).or_default();
            if stage.extended_after_hours.is_some() {
                entry.extended_after_hours = stage.extended_after_hours;
            }
        }
        if file.total_age.mature_after_hours.is_some() {
            self.total_age.mature_after_hours = file.total_age.mature_after_hours;
        }
        if file.total_age.overdue_after_hours.is_some() {
            self.total_age.overdue_after_hours = file.total_age.overdue_after_hours;
        }
        if let Some(limit) = file.warning_display_limit {
            self.warning_display_limit = limit;
        }
        if file.database.is_some() {
            self.database = file.database;
        }
    }

    /// Stage registry with this configuration's threshold overrides
    pub fn stage_registry(&self) -> Result<StageRegistry, StageError> {
        StageRegistry::with_overrides(&self.stages, &self.total_age)
    }

    /// Database to open: the configured path, else the project's database
    pub fn database_path(&self, project: Option<&Project>) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| project.map(|p| p.db_path()))
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "growline")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}
