//! `growline crop` command - single-crop operations

use chrono::{DateTime, Utc};
use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;
use std::collections::HashMap;

use crate::cli::helpers::{format_instant, format_minutes, parse_instant};
use crate::cli::output::{effective_format, print_structured, print_warnings};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{
    detect_issues, ConsistencyIssue, ConsistencyRepair, CropFilter, CropStatus, NextStageStatus,
    Stage, StageAgeStatus, StageClock, TotalAgeStatus, TransitionOutcome, WarningLog,
};
use crate::entities::{Crop, Recipe};

use super::utils::Workspace;

#[derive(Subcommand, Debug)]
pub enum CropCommands {
    /// Plant new crops (they start soaking, without trays)
    Plant(PlantArgs),

    /// List crops with their current status
    List(ListArgs),

    /// Show a crop, its status and any consistency issues
    Show(ShowArgs),

    /// Move a soaking crop into germination under a tray number
    ExitSoak(ExitSoakArgs),

    /// Advance the crop's whole batch to the next stage
    Advance(AdvanceArgs),

    /// Revert the crop's whole batch to the previous stage
    Revert(RevertArgs),

    /// Backfill missing stage timestamps
    Repair(RepairArgs),

    /// Show the stage history of a crop
    History(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct PlantArgs {
    /// Recipe ID
    #[arg(long, short = 'r')]
    pub recipe: i64,

    /// Number of crops to plant
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,

    /// Planting time (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only crops in this stage
    #[arg(long, short = 's')]
    pub stage: Option<Stage>,

    /// Only crops of this recipe
    #[arg(long, short = 'r')]
    pub recipe: Option<i64>,

    /// Include harvested crops
    #[arg(long)]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Crop ID
    pub id: i64,
}

#[derive(clap::Args, Debug)]
pub struct ExitSoakArgs {
    /// Crop ID
    pub id: i64,

    /// Tray number to assign
    #[arg(long, short = 't')]
    pub tray: String,

    /// Time the crop left soaking (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug)]
pub struct AdvanceArgs {
    /// ID of any crop in the batch
    pub id: i64,

    /// Time the batch entered the next stage (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug)]
pub struct RevertArgs {
    /// ID of any crop in the batch
    pub id: i64,

    /// Reason, recorded in the history
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RepairArgs {
    /// Crop ID (omit with --all)
    pub id: Option<i64>,

    /// Repair every crop
    #[arg(long, conflicts_with = "id")]
    pub all: bool,

    /// Report what would change without writing
    #[arg(long, requires = "all")]
    pub dry_run: bool,
}

pub fn run(cmd: CropCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CropCommands::Plant(args) => run_plant(args, global),
        CropCommands::List(args) => run_list(args, global),
        CropCommands::Show(args) => run_show(args, global),
        CropCommands::ExitSoak(args) => run_exit_soak(args, global),
        CropCommands::Advance(args) => run_advance(args, global),
        CropCommands::Revert(args) => run_revert(args, global),
        CropCommands::Repair(args) => run_repair(args, global),
        CropCommands::History(args) => run_history(args, global),
    }
}

fn run_plant(args: PlantArgs, global: &GlobalOpts) -> Result<()> {
    if args.count == 0 {
        miette::bail!("--count must be at least 1");
    }
    let ws = Workspace::open()?;
    let at = args.at.unwrap_or_else(Utc::now);
    let crops = ws.store.plant(args.recipe, args.count, at)?;

    match global.output {
        OutputFormat::Json | OutputFormat::Yaml => {
            print_structured(&crops, global.output)?;
        }
        OutputFormat::Id => {
            for crop in &crops {
                println!("{}", crop.id);
            }
        }
        _ => {
            let ids: Vec<String> = crops.iter().map(|c| c.id.to_string()).collect();
            println!(
                "{} Planted {} crop(s): {}",
                style("✓").green(),
                style(crops.len()).cyan(),
                ids.join(", ")
            );
            println!(
                "   Exit soaking with: {}",
                style("growline crop exit-soak <ID> --tray <TRAY>").yellow()
            );
        }
    }
    Ok(())
}

/// A crop with its status as of now
#[derive(Serialize)]
struct CropView {
    #[serde(flatten)]
    crop: Crop,
    recipe_name: String,
    status: CropStatus,
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let filter = CropFilter {
        stage: args.stage,
        recipe_id: args.recipe,
        include_harvested: args.all || args.stage == Some(Stage::Harvested),
    };
    let crops = ws.store.crops(&filter)?;
    let recipes: HashMap<i64, Recipe> = ws
        .store
        .recipes()?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let clock = StageClock::new(&ws.registry);
    let now = Utc::now();
    let views: Vec<CropView> = crops
        .into_iter()
        .filter_map(|crop| {
            let recipe = recipes.get(&crop.recipe_id)?;
            let status = clock.compute_status(&crop, recipe, now);
            Some(CropView {
                recipe_name: recipe.name.clone(),
                crop,
                status,
            })
        })
        .collect();

    let format = effective_format(global.output, true);
    if print_structured(&views, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for view in &views {
            println!("{}", view.crop.id);
        }
        return Ok(());
    }

    if views.is_empty() {
        println!("No crops found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<8} {:<18} {:<12} {:<10} {:<10} {:<10} {:<9}",
        style("ID").bold(),
        style("TRAY").bold(),
        style("RECIPE").bold(),
        style("STAGE").bold(),
        style("IN STAGE").bold(),
        style("NEXT").bold(),
        style("AGE").bold(),
        style("STATUS").bold()
    );
    println!("{}", "-".repeat(90));
    for view in &views {
        let status = &view.status;
        let next = status
            .time_to_next_stage_minutes
            .map(format_minutes)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<8} {:<18} {:<12} {:<10} {:<10} {:<10} {}",
            view.crop.id,
            view.crop.tray_number.as_deref().unwrap_or("-"),
            crate::cli::helpers::truncate_str(&view.recipe_name, 18),
            view.crop.current_stage.to_string(),
            style_stage_age(status),
            style_next(status.time_to_next_stage_status, next),
            format_minutes(status.total_age_minutes),
            style_total_age(status.total_age_status),
        );
    }
    println!();
    println!("{} crop(s) found", style(views.len()).cyan());
    Ok(())
}

fn style_stage_age(status: &CropStatus) -> String {
    let text = format_minutes(status.stage_age_minutes);
    match status.stage_age_status {
        StageAgeStatus::Extended => style(text).yellow().to_string(),
        StageAgeStatus::Normal => text,
    }
}

fn style_next(status: Option<NextStageStatus>, text: String) -> String {
    match status {
        Some(NextStageStatus::Overdue) => style(text).red().to_string(),
        Some(NextStageStatus::DueNow) => style(text).yellow().to_string(),
        Some(NextStageStatus::Upcoming) => style(text).cyan().to_string(),
        Some(NextStageStatus::OnTrack) | None => text,
    }
}

fn style_total_age(status: TotalAgeStatus) -> String {
    match status {
        TotalAgeStatus::Overdue => style(status).red().to_string(),
        TotalAgeStatus::Mature => style(status).green().to_string(),
        TotalAgeStatus::Growing => status.to_string(),
    }
}

#[derive(Serialize)]
struct CropDetail {
    #[serde(flatten)]
    view: CropView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<ConsistencyIssue>,
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let crop = ws.crop(args.id)?;
    let recipe = ws
        .store
        .recipe(crop.recipe_id)?
        .ok_or_else(|| miette::miette!("Recipe not found: {}", crop.recipe_id))?;
    let status = StageClock::new(&ws.registry).compute_status(&crop, &recipe, Utc::now());
    let issues = detect_issues(&crop, &ws.registry);

    let detail = CropDetail {
        view: CropView {
            crop,
            recipe_name: recipe.name.clone(),
            status,
        },
        issues,
    };

    match global.output {
        OutputFormat::Id => {
            println!("{}", detail.view.crop.id);
            return Ok(());
        }
        OutputFormat::Tsv => {}
        format => {
            if print_structured(&detail, effective_format(format, false))? {
                return Ok(());
            }
        }
    }

    let crop = &detail.view.crop;
    let status = &detail.view.status;
    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("Crop").bold(), style(crop.id).cyan());
    println!(
        "{}: {} ({})",
        style("Recipe").bold(),
        style(&recipe.name).yellow(),
        recipe.id
    );
    println!(
        "{}: {}",
        style("Tray").bold(),
        crop.tray_number.as_deref().unwrap_or("-")
    );
    println!("{}: {}", style("Stage").bold(), crop.current_stage);
    println!("{}: {}", style("Batch").bold(), crop.batch_key());
    println!("{}", style("─".repeat(60)).dim());

    println!();
    println!("{}:", style("Timestamps").bold());
    println!("  {:<12} {}", "planted", format_instant(crop.planting_at));
    for def in ws.registry.definitions() {
        let at = crop
            .stage_at(def.stage)
            .map(format_instant)
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<12} {}", def.stage.to_string(), at);
    }
    if let Some(at) = crop.watering_suspended_at {
        println!("  {:<12} {}", "no watering", format_instant(at));
    }

    println!();
    println!("{}:", style("Status").bold());
    println!(
        "  In stage     {} ({})",
        style_stage_age(status),
        status.stage_age_status
    );
    match (status.time_to_next_stage_minutes, status.time_to_next_stage_status) {
        (Some(minutes), Some(next)) => println!(
            "  Next stage   {} ({})",
            style_next(Some(next), format_minutes(minutes)),
            next
        ),
        _ => println!("  Next stage   -"),
    }
    println!(
        "  Total age    {} ({})",
        format_minutes(status.total_age_minutes),
        style_total_age(status.total_age_status)
    );

    if !detail.issues.is_empty() {
        println!();
        println!(
            "{} {} consistency issue(s):",
            style("!").yellow(),
            detail.issues.len()
        );
        for issue in &detail.issues {
            println!("  • {}", issue);
        }
        println!(
            "  Fix with: {}",
            style(format!("growline crop repair {}", crop.id)).yellow()
        );
    }
    Ok(())
}

fn run_exit_soak(args: ExitSoakArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let at = args.at.unwrap_or_else(Utc::now);
    let crop = ws.engine().advance_from_soaking_at(args.id, &args.tray, at)?;

    match global.output {
        OutputFormat::Json | OutputFormat::Yaml => {
            print_structured(&crop, global.output)?;
        }
        OutputFormat::Id => println!("{}", crop.id),
        _ => println!(
            "{} Crop {} moved to {} in tray {}",
            style("✓").green(),
            style(crop.id).cyan(),
            crop.current_stage,
            style(crop.tray_number.as_deref().unwrap_or("-")).yellow()
        ),
    }
    Ok(())
}

fn run_advance(args: AdvanceArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let at = args.at.unwrap_or_else(Utc::now);
    let outcome = ws.engine().advance_stage(args.id, at)?;
    print_outcome(&outcome, "Advanced", &ws, global)
}

fn run_revert(args: RevertArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let outcome = ws.engine().revert_stage(args.id, args.reason.as_deref())?;
    print_outcome(&outcome, "Reverted", &ws, global)
}

fn print_outcome(
    outcome: &TransitionOutcome,
    verb: &str,
    ws: &Workspace,
    global: &GlobalOpts,
) -> Result<()> {
    if print_structured(outcome, global.output)? {
        return Ok(());
    }
    println!(
        "{} {} {} crop(s) from {} to {}",
        style("✓").green(),
        verb,
        style(outcome.affected_count).cyan(),
        outcome.from_stage,
        style(outcome.to_stage).yellow()
    );
    let mut warnings = WarningLog::new();
    warnings.extend(outcome.warnings.iter().cloned());
    print_warnings(&warnings, ws.config.warning_display_limit);
    Ok(())
}

fn run_repair(args: RepairArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let repair = ConsistencyRepair::new(&ws.store, &ws.registry);

    if args.all {
        let report = repair.repair_all(args.dry_run)?;
        if print_structured(&report, global.output)? {
            return Ok(());
        }
        let verb = if args.dry_run { "Would repair" } else { "Repaired" };
        println!(
            "{} {} {} of {} crop(s)",
            style("✓").green(),
            verb,
            style(report.repaired.len()).cyan(),
            report.inspected
        );
        for (crop_id, issues) in &report.unresolved {
            for issue in issues {
                println!("  {} crop {}: {}", style("!").yellow(), crop_id, issue);
            }
        }
        return Ok(());
    }

    let Some(id) = args.id else {
        miette::bail!("Give a crop ID or --all");
    };
    let changed = repair.repair_crop(id)?;
    if print_structured(&serde_json::json!({ "crop_id": id, "repaired": changed }), global.output)? {
        return Ok(());
    }
    if changed {
        println!("{} Repaired crop {}", style("✓").green(), style(id).cyan());
    } else {
        println!("Crop {} needs no repair", style(id).cyan());
    }
    Ok(())
}

fn run_history(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    ws.crop(args.id)?;
    let history = ws.store.history(args.id)?;

    let format = effective_format(global.output, true);
    if print_structured(&history, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for entry in &history {
            println!("{}", entry.id);
        }
        return Ok(());
    }

    println!(
        "{} {}\n",
        style("History for crop").bold(),
        style(args.id).cyan()
    );
    if history.is_empty() {
        println!("{}", style("No stage changes recorded.").yellow());
        return Ok(());
    }
    for entry in &history {
        let from = entry
            .from_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let to = entry
            .to_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        print!(
            "{}  {:<16} {} -> {}",
            format_instant(entry.occurred_at),
            entry.action.to_string(),
            from,
            to
        );
        match &entry.reason {
            Some(reason) => println!("  ({})", reason),
            None => println!(),
        }
    }
    Ok(())
}
