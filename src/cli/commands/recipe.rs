//! `growline recipe` command - Recipe management

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{format_instant, parse_instant, truncate_str};
use crate::cli::output::{effective_format, print_structured};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Stage;
use crate::entities::{NewRecipe, Recipe};

use super::utils::Workspace;

#[derive(Subcommand, Debug)]
pub enum RecipeCommands {
    /// Create a new recipe
    New(NewArgs),

    /// List recipes
    List,

    /// Show a recipe and its growth plan
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Recipe name (must be unique)
    #[arg(long)]
    pub name: String,

    /// Days in germination
    #[arg(long)]
    pub germination_days: Option<f64>,

    /// Days in blackout
    #[arg(long)]
    pub blackout_days: Option<f64>,

    /// Days under light
    #[arg(long)]
    pub light_days: Option<f64>,

    /// Hours of seed soaking
    #[arg(long)]
    pub soak_hours: Option<f64>,

    /// Total days to maturity, used when stage durations are incomplete
    #[arg(long)]
    pub maturity_days: Option<f64>,

    /// Planning buffer in percent
    #[arg(long, default_value_t = 0.0)]
    pub buffer: f64,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Recipe ID
    pub id: i64,

    /// Plan backwards from this harvest time
    #[arg(long, value_parser = parse_instant)]
    pub harvest_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub fn run(cmd: RecipeCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        RecipeCommands::New(args) => run_new(args, global),
        RecipeCommands::List => run_list(global),
        RecipeCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let recipe = ws.store.insert_recipe(&NewRecipe {
        name: args.name,
        germination_days: args.germination_days,
        blackout_days: args.blackout_days,
        light_days: args.light_days,
        seed_soak_hours: args.soak_hours,
        days_to_maturity: args.maturity_days,
        buffer_percentage: args.buffer,
    })?;

    match global.output {
        OutputFormat::Id => println!("{}", recipe.id),
        OutputFormat::Json | OutputFormat::Yaml => {
            print_structured(&recipe, global.output)?;
        }
        _ => println!(
            "{} Created recipe {} {}",
            style("✓").green(),
            style(recipe.id).cyan(),
            style(&recipe.name).yellow()
        ),
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let recipes = ws.store.recipes()?;
    let format = effective_format(global.output, true);

    if print_structured(&recipes, format)? {
        return Ok(());
    }
    if format == OutputFormat::Id {
        for recipe in &recipes {
            println!("{}", recipe.id);
        }
        return Ok(());
    }

    if recipes.is_empty() {
        println!("No recipes found.");
        println!();
        println!(
            "Create one with: {}",
            style("growline recipe new --name <NAME>").yellow()
        );
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<8} {:<8} {:<8} {:<8} {:<8}",
        style("ID").bold(),
        style("NAME").bold(),
        style("SOAK").bold(),
        style("GERM").bold(),
        style("BLACKOUT").bold(),
        style("LIGHT").bold(),
        style("TOTAL").bold()
    );
    println!("{}", "-".repeat(76));
    for recipe in &recipes {
        println!(
            "{:<6} {:<24} {:<8} {:<8} {:<8} {:<8} {:<8}",
            recipe.id,
            truncate_str(&recipe.name, 24),
            opt(recipe.seed_soak_hours, "h"),
            opt(recipe.germination_days, "d"),
            opt(recipe.blackout_days, "d"),
            opt(recipe.light_days, "d"),
            opt(recipe.total_growth_days(), "d"),
        );
    }
    println!();
    println!("{} recipe(s) found", style(recipes.len()).cyan());
    Ok(())
}

#[derive(Serialize)]
struct RecipePlan<'a> {
    #[serde(flatten)]
    recipe: &'a Recipe,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_growth_days: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    harvest_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest_planting_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open()?;
    let recipe = ws
        .store
        .recipe(args.id)?
        .ok_or_else(|| miette::miette!("Recipe not found: {}", args.id))?;

    let plan = RecipePlan {
        recipe: &recipe,
        total_growth_days: recipe.total_growth_days(),
        harvest_at: args.harvest_at,
        latest_planting_at: args
            .harvest_at
            .and_then(|harvest| recipe.latest_planting_for(harvest)),
    };

    match global.output {
        OutputFormat::Id => {
            println!("{}", recipe.id);
            return Ok(());
        }
        OutputFormat::Tsv => {}
        format => {
            if print_structured(&plan, effective_format(format, false))? {
                return Ok(());
            }
        }
    }

    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(recipe.id).cyan());
    println!("{}: {}", style("Name").bold(), style(&recipe.name).yellow());
    println!("{}", style("─".repeat(60)).dim());
    for stage in [Stage::Soaking, Stage::Germination, Stage::Blackout, Stage::Light] {
        let duration = recipe
            .stage_duration(stage)
            .map(|d| crate::cli::helpers::format_minutes(d.num_minutes()))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<12} {}", stage.to_string(), duration);
    }
    println!();
    println!(
        "{}: {}",
        style("Total growth").bold(),
        opt(plan.total_growth_days, " days")
    );
    println!("{}: {}%", style("Buffer").bold(), recipe.buffer_percentage);
    if let (Some(harvest), Some(latest)) = (plan.harvest_at, plan.latest_planting_at) {
        println!(
            "{}: plant by {} to harvest at {}",
            style("Plan").bold(),
            style(format_instant(latest)).cyan(),
            format_instant(harvest)
        );
    }
    Ok(())
}

fn opt(value: Option<f64>, unit: &str) -> String {
    value
        .map(|v| format!("{}{}", v, unit))
        .unwrap_or_else(|| "-".to_string())
}
