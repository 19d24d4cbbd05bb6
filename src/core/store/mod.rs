//! SQLite-backed crop store
//!
//! Holds recipes, crops, the stage history audit log and scheduled tasks.
//! Stage-changing writes go through [`StoreTx`], a thin wrapper over a
//! rusqlite transaction: dropping it without [`StoreTx::commit`] rolls back
//! every row it touched.

mod serialize;

#[cfg(test)]
mod tests;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::stage::Stage;
use crate::core::watering::{SchedulerError, TaskScheduler, TaskType};
use crate::entities::{Batch, BatchKey, Crop, NewRecipe, Recipe};

/// Errors from the crop store
#[derive(Debug, Error, miette::Diagnostic)]
pub enum StoreError {
    #[error("Database error: {0}")]
    #[diagnostic(code(growline::store::sqlite))]
    Sqlite(#[from] rusqlite::Error),

    #[error("Recipe not found: {0}")]
    #[diagnostic(code(growline::store::recipe_not_found))]
    RecipeNotFound(i64),

    #[error("Crop not found: {0}")]
    #[diagnostic(code(growline::store::crop_not_found))]
    CropNotFound(i64),

    #[error("Recipe '{0}' already exists")]
    #[diagnostic(code(growline::store::duplicate_recipe))]
    DuplicateRecipe(String),

    #[error("Invalid recipe: {0}")]
    #[diagnostic(code(growline::store::invalid_recipe))]
    InvalidRecipe(String),

    #[error("Failed to create database directory {}: {source}", .path.display())]
    #[diagnostic(code(growline::store::io))]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Kind of change recorded in the stage history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Advance,
    Revert,
    ExitSoaking,
    Repair,
    SuspendWatering,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryAction::Advance => write!(f, "advance"),
            HistoryAction::Revert => write!(f, "revert"),
            HistoryAction::ExitSoaking => write!(f, "exit_soaking"),
            HistoryAction::Repair => write!(f, "repair"),
            HistoryAction::SuspendWatering => write!(f, "suspend_watering"),
        }
    }
}

/// One row of the stage history audit log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub crop_id: i64,
    pub action: HistoryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_stage: Option<Stage>,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A history row about to be written
#[derive(Debug, Clone)]
pub struct NewHistoryEntry<'a> {
    pub crop_id: i64,
    pub action: HistoryAction,
    pub from_stage: Option<Stage>,
    pub to_stage: Option<Stage>,
    pub occurred_at: DateTime<Utc>,
    pub reason: Option<&'a str>,
}

/// A scheduled per-crop task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub id: i64,
    pub crop_id: i64,
    pub task_type: TaskType,
    pub run_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Filter for crop listings
#[derive(Debug, Clone, Default)]
pub struct CropFilter {
    pub stage: Option<Stage>,
    pub recipe_id: Option<i64>,
    pub include_harvested: bool,
}

const CROP_COLUMNS: &str = "id, recipe_id, tray_number, current_stage, planting_at, \
     stage_updated_at, soaking_at, germination_at, blackout_at, light_at, harvested_at, \
     watering_suspended_at";

const RECIPE_COLUMNS: &str = "id, name, germination_days, blackout_days, light_days, \
     seed_soak_hours, days_to_maturity, buffer_percentage";

/// Handle to the growline database
pub struct CropStore {
    conn: Connection,
}

impl CropStore {
    /// Open (or create) a database at the given path and run migrations
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS recipes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                germination_days REAL,
                blackout_days REAL,
                light_days REAL,
                seed_soak_hours REAL,
                days_to_maturity REAL,
                buffer_percentage REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS crops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipe_id INTEGER NOT NULL REFERENCES recipes(id),
                tray_number TEXT,
                current_stage TEXT NOT NULL DEFAULT 'soaking',
                planting_at TEXT NOT NULL,
                stage_updated_at TEXT NOT NULL,
                soaking_at TEXT,
                germination_at TEXT,
                blackout_at TEXT,
                light_at TEXT,
                harvested_at TEXT,
                watering_suspended_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_crops_batch
                ON crops(recipe_id, current_stage, planting_at);
            CREATE INDEX IF NOT EXISTS idx_crops_tray ON crops(tray_number);

            CREATE TABLE IF NOT EXISTS crop_stage_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crop_id INTEGER NOT NULL REFERENCES crops(id) ON DELETE CASCADE,
                action TEXT NOT NULL,
                from_stage TEXT,
                to_stage TEXT,
                occurred_at TEXT NOT NULL,
                reason TEXT
            );

            CREATE TABLE IF NOT EXISTS task_schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crop_id INTEGER NOT NULL REFERENCES crops(id) ON DELETE CASCADE,
                task_type TEXT NOT NULL,
                run_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            ",
        )?;
        Ok(())
    }

    /// Begin a transaction for a multi-row write
    pub fn begin(&self) -> Result<StoreTx<'_>, StoreError> {
        // Callers never hold two StoreTx at once
        let tx = self.conn.unchecked_transaction()?;
        Ok(StoreTx { tx })
    }

    // =====================================================================
    // Recipes
    // =====================================================================

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError> {
        validate_recipe(recipe)?;
        let name = recipe.name.trim();

        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM recipes WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::DuplicateRecipe(name.to_string()));
        }

        self.conn.execute(
            "INSERT INTO recipes (name, germination_days, blackout_days, light_days,
                seed_soak_hours, days_to_maturity, buffer_percentage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                recipe.germination_days,
                recipe.blackout_days,
                recipe.light_days,
                recipe.seed_soak_hours,
                recipe.days_to_maturity,
                recipe.buffer_percentage,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(recipe_id = id, name, "Inserted recipe");
        self.recipe(id)?.ok_or(StoreError::RecipeNotFound(id))
    }

    pub fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        query_recipe(&self.conn, id)
    }

    pub fn recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        let sql = format!("SELECT {} FROM recipes ORDER BY name", RECIPE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], recipe_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =====================================================================
    // Crops
    // =====================================================================

    /// Plant `count` new crops; they start anonymous, in the soaking stage
    pub fn plant(
        &self,
        recipe_id: i64,
        count: u32,
        planting_at: DateTime<Utc>,
    ) -> Result<Vec<Crop>, StoreError> {
        if self.recipe(recipe_id)?.is_none() {
            return Err(StoreError::RecipeNotFound(recipe_id));
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            tx.execute(
                "INSERT INTO crops (recipe_id, current_stage, planting_at, stage_updated_at, soaking_at)
                 VALUES (?1, ?2, ?3, ?3, ?3)",
                params![recipe_id, Stage::Soaking, planting_at],
            )?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit()?;
        debug!(recipe_id, count, "Planted crops");

        ids.into_iter()
            .filter_map(|id| self.crop(id).transpose())
            .collect()
    }

    pub fn crop(&self, id: i64) -> Result<Option<Crop>, StoreError> {
        query_crop(&self.conn, id)
    }

    pub fn crops(&self, filter: &CropFilter) -> Result<Vec<Crop>, StoreError> {
        let sql = format!(
            "SELECT {} FROM crops
             WHERE (?1 IS NULL OR current_stage = ?1)
               AND (?2 IS NULL OR recipe_id = ?2)
               AND (?3 OR current_stage != 'harvested')
             ORDER BY planting_at, id",
            CROP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![filter.stage, filter.recipe_id, filter.include_harvested],
            crop_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every crop in the batch identified by `key`
    pub fn batch_members(&self, key: &BatchKey) -> Result<Vec<Crop>, StoreError> {
        query_batch_members(&self.conn, key)
    }

    /// Active (not harvested) batches, ordered by planting date
    pub fn active_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let crops = self.crops(&CropFilter::default())?;
        let names: HashMap<i64, String> = self
            .recipes()?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();

        let mut grouped: BTreeMap<(NaiveDate, i64, Stage), Batch> = BTreeMap::new();
        for crop in crops {
            let key = crop.batch_key();
            let batch = grouped
                .entry((key.planting_date, key.recipe_id, key.stage))
                .or_insert_with(|| Batch {
                    key,
                    recipe_name: names.get(&key.recipe_id).cloned().unwrap_or_default(),
                    crop_ids: Vec::new(),
                    tray_numbers: Vec::new(),
                    stage_updated_at: crop.stage_updated_at,
                });
            batch.crop_ids.push(crop.id);
            if let Some(tray) = crop.tray_number {
                batch.tray_numbers.push(tray);
            }
            if crop.stage_updated_at > batch.stage_updated_at {
                batch.stage_updated_at = crop.stage_updated_at;
            }
        }

        Ok(grouped.into_values().collect())
    }

    /// Stage history for a crop, oldest first
    pub fn history(&self, crop_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, crop_id, action, from_stage, to_stage, occurred_at, reason
             FROM crop_stage_history WHERE crop_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![crop_id], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                crop_id: row.get(1)?,
                action: row.get(2)?,
                from_stage: row.get(3)?,
                to_stage: row.get(4)?,
                occurred_at: row.get(5)?,
                reason: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =====================================================================
    // Scheduled tasks
    // =====================================================================

    pub fn schedule_task(
        &self,
        crop_id: i64,
        task_type: TaskType,
        run_at: DateTime<Utc>,
    ) -> Result<ScheduledTask, StoreError> {
        self.conn.execute(
            "INSERT INTO task_schedules (crop_id, task_type, run_at) VALUES (?1, ?2, ?3)",
            params![crop_id, task_type, run_at],
        )?;
        Ok(ScheduledTask {
            id: self.conn.last_insert_rowid(),
            crop_id,
            task_type,
            run_at,
            is_active: true,
        })
    }

    pub fn tasks(&self, active_only: bool) -> Result<Vec<ScheduledTask>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, crop_id, task_type, run_at, is_active FROM task_schedules
             WHERE (?1 = 0 OR is_active = 1) ORDER BY run_at, id",
        )?;
        let rows = stmt.query_map(params![active_only], |row| {
            Ok(ScheduledTask {
                id: row.get(0)?,
                crop_id: row.get(1)?,
                task_type: row.get(2)?,
                run_at: row.get(3)?,
                is_active: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl TaskScheduler for CropStore {
    fn deactivate(&self, crop_id: i64, task_type: TaskType) -> Result<usize, SchedulerError> {
        self.conn
            .execute(
                "UPDATE task_schedules SET is_active = 0
                 WHERE crop_id = ?1 AND task_type = ?2 AND is_active = 1",
                params![crop_id, task_type],
            )
            .map_err(|e| SchedulerError(e.to_string()))
    }
}

/// An open write transaction on the store
pub struct StoreTx<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn crop(&self, id: i64) -> Result<Option<Crop>, StoreError> {
        query_crop(&self.tx, id)
    }

    pub fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        query_recipe(&self.tx, id)
    }

    pub fn batch_members(&self, key: &BatchKey) -> Result<Vec<Crop>, StoreError> {
        query_batch_members(&self.tx, key)
    }

    /// Another active crop already holding `tray`, if any
    pub fn tray_holder(&self, tray: &str, excluding: i64) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id FROM crops
                 WHERE tray_number = ?1 AND current_stage != 'harvested' AND id != ?2
                 LIMIT 1",
                params![tray, excluding],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Write every mutable field of a crop
    pub fn save_crop(&self, crop: &Crop) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE crops SET
                tray_number = ?1, current_stage = ?2, planting_at = ?3, stage_updated_at = ?4,
                soaking_at = ?5, germination_at = ?6, blackout_at = ?7, light_at = ?8,
                harvested_at = ?9, watering_suspended_at = ?10
             WHERE id = ?11",
            params![
                crop.tray_number,
                crop.current_stage,
                crop.planting_at,
                crop.stage_updated_at,
                crop.soaking_at,
                crop.germination_at,
                crop.blackout_at,
                crop.light_at,
                crop.harvested_at,
                crop.watering_suspended_at,
                crop.id,
            ],
        )?;
        Ok(())
    }

    pub fn record_history(&self, entry: &NewHistoryEntry<'_>) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO crop_stage_history (crop_id, action, from_stage, to_stage, occurred_at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.crop_id,
                entry.action,
                entry.from_stage,
                entry.to_stage,
                entry.occurred_at,
                entry.reason,
            ],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

/// Upper bound for any single recipe duration, in days
const MAX_STAGE_DAYS: f64 = 3650.0;

const MAX_BUFFER_PERCENTAGE: f64 = 1000.0;

fn validate_recipe(recipe: &NewRecipe) -> Result<(), StoreError> {
    if recipe.name.trim().is_empty() {
        return Err(StoreError::InvalidRecipe("name is required".to_string()));
    }

    let durations = [
        ("germination_days", recipe.germination_days, MAX_STAGE_DAYS),
        ("blackout_days", recipe.blackout_days, MAX_STAGE_DAYS),
        ("light_days", recipe.light_days, MAX_STAGE_DAYS),
        ("seed_soak_hours", recipe.seed_soak_hours, MAX_STAGE_DAYS * 24.0),
        ("days_to_maturity", recipe.days_to_maturity, MAX_STAGE_DAYS),
    ];
    for (field, value, max) in durations {
        if let Some(v) = value {
            if !v.is_finite() || !(0.0..=max).contains(&v) {
                return Err(StoreError::InvalidRecipe(format!(
                    "{} must be between 0 and {}",
                    field, max
                )));
            }
        }
    }

    if !recipe.buffer_percentage.is_finite()
        || !(0.0..=MAX_BUFFER_PERCENTAGE).contains(&recipe.buffer_percentage)
    {
        return Err(StoreError::InvalidRecipe(format!(
            "buffer_percentage must be between 0 and {}",
            MAX_BUFFER_PERCENTAGE
        )));
    }

    Ok(())
}

fn query_crop(conn: &Connection, id: i64) -> Result<Option<Crop>, StoreError> {
    let sql = format!("SELECT {} FROM crops WHERE id = ?1", CROP_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], crop_from_row)
        .optional()?)
}

fn query_recipe(conn: &Connection, id: i64) -> Result<Option<Recipe>, StoreError> {
    let sql = format!("SELECT {} FROM recipes WHERE id = ?1", RECIPE_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], recipe_from_row)
        .optional()?)
}

fn query_batch_members(conn: &Connection, key: &BatchKey) -> Result<Vec<Crop>, StoreError> {
    let sql = format!(
        "SELECT {} FROM crops
         WHERE recipe_id = ?1 AND current_stage = ?2 AND substr(planting_at, 1, 10) = ?3
         ORDER BY id",
        CROP_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            key.recipe_id,
            key.stage,
            key.planting_date.format("%Y-%m-%d").to_string()
        ],
        crop_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn crop_from_row(row: &Row<'_>) -> rusqlite::Result<Crop> {
    Ok(Crop {
        id: row.get(0)?,
        recipe_id: row.get(1)?,
        tray_number: row.get(2)?,
        current_stage: row.get(3)?,
        planting_at: row.get(4)?,
        stage_updated_at: row.get(5)?,
        soaking_at: row.get(6)?,
        germination_at: row.get(7)?,
        blackout_at: row.get(8)?,
        light_at: row.get(9)?,
        harvested_at: row.get(10)?,
        watering_suspended_at: row.get(11)?,
    })
}

fn recipe_from_row(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        germination_days: row.get(2)?,
        blackout_days: row.get(3)?,
        light_days: row.get(4)?,
        seed_soak_hours: row.get(5)?,
        days_to_maturity: row.get(6)?,
        buffer_percentage: row.get(7)?,
    })
}
