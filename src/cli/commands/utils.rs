//! Shared utilities for CLI commands

use miette::Result;

use crate::cli::helpers::{parse_crop_ids, read_ids_from_stdin};
use crate::core::{Config, CropStore, Project, StageRegistry, TransitionEngine};
use crate::entities::Crop;

/// Everything a command needs to touch the crop database
pub struct Workspace {
    pub config: Config,
    pub store: CropStore,
    pub registry: StageRegistry,
}

impl Workspace {
    /// Open the database for the current project (or `GROWLINE_DB`)
    pub fn open() -> Result<Self> {
        let project = Project::discover();
        let config = Config::load_for(project.as_ref().ok());

        let path = match (&config.database, project) {
            (Some(path), _) => path.clone(),
            (None, Ok(project)) => project.db_path(),
            (None, Err(e)) => return Err(e.into()),
        };

        let registry = config.stage_registry()?;
        let store = CropStore::open(&path)?;
        Ok(Self {
            config,
            store,
            registry,
        })
    }

    pub fn engine(&self) -> TransitionEngine<'_> {
        TransitionEngine::new(&self.store, &self.registry)
    }

    pub fn crop(&self, id: i64) -> Result<Crop> {
        self.store
            .crop(id)?
            .ok_or_else(|| miette::miette!("Crop not found: {}", id))
    }
}

/// Crop IDs from arguments, or from stdin when none were given
pub fn collect_crop_ids(args: &[String]) -> Result<Vec<i64>> {
    let raw = if args.is_empty() {
        read_ids_from_stdin().unwrap_or_default()
    } else {
        args.to_vec()
    };
    if raw.is_empty() {
        miette::bail!("No crop IDs given (pass them as arguments or pipe them on stdin)");
    }
    parse_crop_ids(&raw).map_err(|e| miette::miette!("{}", e))
}
