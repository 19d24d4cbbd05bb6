use clap::{CommandFactory, Parser};
use growline::cli::{Cli, Commands};
use miette::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GROWLINE_LOG").unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let global = cli.global;
    match cli.command {
        Commands::Init(args) => growline::cli::commands::init::run(args),
        Commands::Recipe(cmd) => growline::cli::commands::recipe::run(cmd, &global),
        Commands::Crop(cmd) => growline::cli::commands::crop::run(cmd, &global),
        Commands::Batch(cmd) => growline::cli::commands::batch::run(cmd, &global),
        Commands::Task(cmd) => growline::cli::commands::task::run(cmd, &global),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "growline", &mut std::io::stdout());
            Ok(())
        }
    }
}
