//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::batch::BatchCommands;
use crate::cli::commands::crop::CropCommands;
use crate::cli::commands::init::InitArgs;
use crate::cli::commands::recipe::RecipeCommands;
use crate::cli::commands::task::TaskCommands;

/// Track microgreen crops through soaking, germination, blackout, light and harvest
#[derive(Parser, Debug)]
#[command(name = "growline", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long = "format", short = 'f', global = true, default_value = "auto")]
    pub output: OutputFormat,

    /// Show debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tables for lists, YAML for single records
    Auto,
    /// Tab-aligned table
    Tsv,
    Json,
    Yaml,
    /// IDs only, one per line
    Id,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a growline project in the current directory
    Init(InitArgs),

    /// Manage recipes
    #[command(subcommand)]
    Recipe(RecipeCommands),

    /// Plant, inspect and move individual crops
    #[command(subcommand)]
    Crop(CropCommands),

    /// List batches and run bulk stage changes
    #[command(subcommand)]
    Batch(BatchCommands),

    /// Scheduled per-crop tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}
