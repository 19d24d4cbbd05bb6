//! `growline batch` command - batch listing and bulk stage changes

use chrono::{DateTime, Utc};
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{format_instant, parse_instant, truncate_str};
use crate::cli::output::{effective_format, print_structured, print_warnings};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{BatchFailure, BatchOperationCoordinator, WateringSuspension};
use crate::entities::BatchKey;

use super::utils::{collect_crop_ids, Workspace};

#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// List active (not harvested) batches
    List,

    /// Advance several batches, each named by one of its crops
    Advance(AdvanceArgs),

    /// Revert several batches, each named by one of its crops
    Revert(RevertArgs),

    /// Suspend watering for a light-stage batch
    SuspendWatering(SuspendArgs),
}

#[derive(clap::Args, Debug)]
pub struct AdvanceArgs {
    /// Crop IDs (read from stdin if omitted)
    pub ids: Vec<String>,

    /// Time the batches entered their next stage (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug)]
pub struct RevertArgs {
    /// Crop IDs (read from stdin if omitted)
    pub ids: Vec<String>,

    /// Reason, recorded in each crop's history
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SuspendArgs {
    /// ID of any crop in the batch
    pub id: i64,

    /// Suspension time (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

pub fn run(cmd: BatchCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BatchCommands::List => run_list(global),
        BatchCommands::Advance(args) => run_advance(args, global),
        BatchCommands::Revert(args) => run_revert(args, global),
        BatchCommands::SuspendWatering(args) => run_suspend(args, global),
    }
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let batches = ws.store.active_batches()?;

    let format = effective_format(global.output, true);
    if print_structured(&batches, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        // One representative crop per batch, ready to pipe into a bulk command
        for batch in &batches {
            if let Some(id) = batch.representative() {
                println!("{}", id);
            }
        }
        return Ok(());
    }

    if batches.is_empty() {
        println!("No active batches.");
        return Ok(());
    }

    println!(
        "{:<18} {:<11} {:<12} {:<6} {:<17} {:<20}",
        style("RECIPE").bold(),
        style("PLANTED").bold(),
        style("STAGE").bold(),
        style("CROPS").bold(),
        style("SINCE").bold(),
        style("TRAYS").bold()
    );
    println!("{}", "-".repeat(88));
    for batch in &batches {
        let trays = if batch.tray_numbers.is_empty() {
            "-".to_string()
        } else {
            batch.tray_numbers.join(",")
        };
        println!(
            "{:<18} {:<11} {:<12} {:<6} {:<17} {}",
            truncate_str(&batch.recipe_name, 18),
            batch.key.planting_date.to_string(),
            batch.key.stage.to_string(),
            batch.crop_count(),
            format_instant(batch.stage_updated_at),
            truncate_str(&trays, 20)
        );
    }
    println!();
    println!("{} batch(es) found", style(batches.len()).cyan());
    Ok(())
}

/// Batch keys for the given crop IDs, in argument order
fn resolve_keys(ws: &Workspace, ids: &[String]) -> Result<Vec<BatchKey>> {
    collect_crop_ids(ids)?
        .into_iter()
        .map(|id| ws.crop(id).map(|crop| crop.batch_key()))
        .collect()
}

fn run_advance(args: AdvanceArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let keys = resolve_keys(&ws, &args.ids)?;
    let at = args.at.unwrap_or_else(Utc::now);

    let report = BatchOperationCoordinator::new(ws.engine()).bulk_advance(&keys, at);
    if print_structured(&report, global.output)? {
        return Ok(());
    }

    if report.aborted {
        println!(
            "{} Nothing advanced: soaking batches must leave soaking crop by crop",
            style("✗").red()
        );
    } else {
        println!(
            "{} Advanced {} batch(es), {} crop(s); {} failed",
            style("✓").green(),
            style(report.batches_succeeded).cyan(),
            style(report.total_affected_units).cyan(),
            report.batches_failed
        );
    }
    print_failures(&report.failures);
    print_warnings(&report.warnings, ws.config.warning_display_limit);
    Ok(())
}

fn run_revert(args: RevertArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let keys = resolve_keys(&ws, &args.ids)?;

    let report =
        BatchOperationCoordinator::new(ws.engine()).bulk_revert(&keys, args.reason.as_deref());
    if print_structured(&report, global.output)? {
        return Ok(());
    }

    println!(
        "{} Reverted {} batch(es), {} crop(s); {} skipped, {} failed",
        style("✓").green(),
        style(report.batches_succeeded).cyan(),
        style(report.total_affected_units).cyan(),
        report.batches_skipped,
        report.batches_failed
    );
    print_failures(&report.failures);
    print_warnings(&report.warnings, ws.config.warning_display_limit);
    Ok(())
}

fn print_failures(failures: &[BatchFailure]) {
    for failure in failures {
        println!(
            "  {} {} [{:?}]: {}",
            style("✗").red(),
            failure.batch,
            failure.kind,
            failure.message
        );
    }
}

fn run_suspend(args: SuspendArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let at = args.at.unwrap_or_else(Utc::now);
    let watering = WateringSuspension::new(ws.engine(), &ws.store);
    let count = watering.suspend_watering(args.id, at)?;

    if print_structured(
        &serde_json::json!({ "affected_count": count, "suspended_at": at }),
        global.output,
    )? {
        return Ok(());
    }
    println!(
        "{} Suspended watering for {} crop(s)",
        style("✓").green(),
        style(count).cyan()
    );
    Ok(())
}
