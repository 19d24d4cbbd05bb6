//! Project discovery - locating the `.growline/` directory

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-project metadata directory
pub const PROJECT_DIR: &str = ".growline";

/// Database file inside [`PROJECT_DIR`]
pub const DATABASE_FILE: &str = "growline.db";

/// Project config file inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error, miette::Diagnostic)]
pub enum ProjectError {
    #[error("Not a growline project (no .growline directory in {} or any parent)", .0.display())]
    #[diagnostic(
        code(growline::project::not_found),
        help("run `growline init` to create a project here")
    )]
    NotFound(PathBuf),

    #[error("Project already initialized at {}", .0.display())]
    #[diagnostic(code(growline::project::exists))]
    AlreadyExists(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    #[diagnostic(code(growline::project::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A growline project rooted at the directory holding `.growline/`
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let cwd = std::env::current_dir().map_err(|source| ProjectError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::discover_from(&cwd)
    }

    /// Walk up from `start` looking for a `.growline/` directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        start
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).is_dir())
            .map(|root| Self {
                root: root.to_path_buf(),
            })
            .ok_or_else(|| ProjectError::NotFound(start.to_path_buf()))
    }

    /// Create `.growline/` under `root`
    pub fn init(root: &Path) -> Result<Self, ProjectError> {
        let dir = root.join(PROJECT_DIR);
        if dir.exists() {
            return Err(ProjectError::AlreadyExists(root.to_path_buf()));
        }
        std::fs::create_dir_all(&dir).map_err(|source| ProjectError::Io {
            path: dir.clone(),
            source,
        })?;

        let config = dir.join(CONFIG_FILE);
        std::fs::write(&config, DEFAULT_PROJECT_CONFIG).map_err(|source| ProjectError::Io {
            path: config,
            source,
        })?;

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn growline_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.growline_dir().join(DATABASE_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.growline_dir().join(CONFIG_FILE)
    }
}

const DEFAULT_PROJECT_CONFIG: &str = "\
# growline project configuration
#
# stages:
#   germination:
#     extended_after_hours: 48
# total_age:
#   mature_after_hours: 264
#   overdue_after_hours: 336
# warning_display_limit: 5
";
