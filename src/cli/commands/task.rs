//! `growline task` command - scheduled per-crop tasks

use chrono::{DateTime, Utc};
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{format_instant, parse_instant};
use crate::cli::output::{effective_format, print_structured};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::TaskType;

use super::utils::Workspace;

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List scheduled tasks
    List(ListArgs),

    /// Schedule a task for a crop
    Schedule(ScheduleArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include deactivated tasks
    #[arg(long)]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct ScheduleArgs {
    /// Crop ID
    pub crop: i64,

    /// Task type
    #[arg(long = "type", short = 't', default_value = "suspend-watering")]
    pub task_type: TaskType,

    /// When the task should run
    #[arg(long, value_parser = parse_instant)]
    pub at: DateTime<Utc>,
}

pub fn run(cmd: TaskCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TaskCommands::List(args) => run_list(args, global),
        TaskCommands::Schedule(args) => run_schedule(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let tasks = ws.store.tasks(!args.all)?;

    let format = effective_format(global.output, true);
    if print_structured(&tasks, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for task in &tasks {
            println!("{}", task.id);
        }
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No scheduled tasks.");
        return Ok(());
    }

    println!(
        "{:<6} {:<6} {:<18} {:<17} {:<8}",
        style("ID").bold(),
        style("CROP").bold(),
        style("TYPE").bold(),
        style("RUN AT").bold(),
        style("ACTIVE").bold()
    );
    println!("{}", "-".repeat(58));
    for task in &tasks {
        println!(
            "{:<6} {:<6} {:<18} {:<17} {}",
            task.id,
            task.crop_id,
            task.task_type.to_string(),
            format_instant(task.run_at),
            if task.is_active { "yes" } else { "no" }
        );
    }
    println!();
    println!("{} task(s) found", style(tasks.len()).cyan());
    Ok(())
}

fn run_schedule(args: ScheduleArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    ws.crop(args.crop)?;
    let task = ws.store.schedule_task(args.crop, args.task_type, args.at)?;

    match global.output {
        OutputFormat::Id => println!("{}", task.id),
        OutputFormat::Json | OutputFormat::Yaml => {
            print_structured(&task, global.output)?;
        }
        _ => println!(
            "{} Scheduled {} for crop {} at {}",
            style("✓").green(),
            task.task_type,
            style(task.crop_id).cyan(),
            format_instant(task.run_at)
        ),
    }
    Ok(())
}
