//! `growline init` command - create a project

use console::style;
use miette::Result;

use crate::core::project::{Project, ProjectError};
use crate::core::CropStore;

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    pub path: Option<std::path::PathBuf>,
}

pub fn run(args: InitArgs) -> Result<()> {
    let root = match args.path {
        Some(path) => path,
        None => std::env::current_dir().map_err(|e| miette::miette!("{}", e))?,
    };

    let project = match Project::init(&root) {
        Ok(project) => project,
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} A growline project already exists at {}",
                style("!").yellow(),
                path.display()
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    CropStore::open(&project.db_path())?;

    println!(
        "{} Initialized growline project in {}",
        style("✓").green(),
        style(project.root().display()).cyan()
    );
    println!();
    println!(
        "Add a recipe with: {}",
        style("growline recipe new --name <NAME> --germination-days 3 ...").yellow()
    );

    Ok(())
}
