//! Shared test helpers for integration tests

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use growline::core::CropStore;
use growline::entities::{Crop, NewRecipe, Recipe};

/// Helper to get a growline command isolated from the caller's environment
pub fn growline() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("growline"));
    cmd.env_remove("GROWLINE_DB").env_remove("GROWLINE_LOG");
    cmd
}

/// Helper to create a test project in a temp directory
pub fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    growline().current_dir(tmp.path()).arg("init").assert().success();
    tmp
}

/// Helper to create a recipe; returns its ID
pub fn create_test_recipe(tmp: &TempDir, name: &str) -> String {
    let output = growline()
        .current_dir(tmp.path())
        .args([
            "recipe",
            "new",
            "--name",
            name,
            "--germination-days",
            "3",
            "--blackout-days",
            "2",
            "--light-days",
            "7",
            "--format",
            "id",
        ])
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Helper to plant crops; returns their IDs
pub fn plant_test_crops(tmp: &TempDir, recipe_id: &str, count: u32, at: &str) -> Vec<String> {
    let output = growline()
        .current_dir(tmp.path())
        .args([
            "crop",
            "plant",
            "--recipe",
            recipe_id,
            "--count",
            &count.to_string(),
            "--at",
            at,
            "--format",
            "id",
        ])
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Fixed reference instant, 2024-01-01 08:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

/// Germination 3 days, blackout 2 days, light 7 days, no soak
pub fn microgreen_recipe(name: &str) -> NewRecipe {
    NewRecipe {
        name: name.to_string(),
        germination_days: Some(3.0),
        blackout_days: Some(2.0),
        light_days: Some(7.0),
        seed_soak_hours: None,
        days_to_maturity: None,
        buffer_percentage: 0.0,
    }
}

/// In-memory store with one recipe and `count` crops planted at [`t0`]
pub fn planted_store(count: u32) -> (CropStore, Recipe, Vec<Crop>) {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&microgreen_recipe("Pea")).unwrap();
    let crops = store.plant(recipe.id, count, t0()).unwrap();
    (store, recipe, crops)
}
