//! Unit tests for the crop store

use super::*;
use crate::core::clock::StageClock;
use crate::core::project::Project;
use crate::core::stage::StageRegistry;
use crate::core::transition::{ErrorKind, TransitionEngine};
use chrono::{Duration, TimeZone};
use tempfile::tempdir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 22, 30, 0).unwrap()
}

fn basil() -> NewRecipe {
    NewRecipe {
        name: "Basil".to_string(),
        germination_days: Some(4.0),
        blackout_days: Some(3.0),
        light_days: Some(10.0),
        ..NewRecipe::default()
    }
}

#[test]
fn test_store_creation() {
    let tmp = tempdir().unwrap();
    let project = Project::init(tmp.path()).unwrap();
    let store = CropStore::open(&project.db_path()).unwrap();

    assert!(store.recipes().unwrap().is_empty());
    assert!(project.db_path().exists());

    // Migrations are idempotent
    drop(store);
    CropStore::open(&project.db_path()).unwrap();
}

#[test]
fn test_open_creates_parent_directory() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("nested").join("farm.db");
    CropStore::open(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_recipe_insert_and_lookup() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store
        .insert_recipe(&NewRecipe {
            name: "  Pea Shoots ".to_string(),
            ..basil()
        })
        .unwrap();

    assert_eq!(recipe.name, "Pea Shoots");
    assert_eq!(recipe.germination_days, Some(4.0));
    assert_eq!(store.recipe(recipe.id).unwrap(), Some(recipe));
    assert_eq!(store.recipe(42).unwrap(), None);
}

#[test]
fn test_recipe_validation() {
    let store = CropStore::open_in_memory().unwrap();
    store.insert_recipe(&basil()).unwrap();

    let dup = store.insert_recipe(&NewRecipe {
        name: " Basil".to_string(),
        ..basil()
    });
    assert!(matches!(dup, Err(StoreError::DuplicateRecipe(name)) if name == "Basil"));

    let blank = store.insert_recipe(&NewRecipe::default());
    assert!(matches!(blank, Err(StoreError::InvalidRecipe(_))));

    let negative = store.insert_recipe(&NewRecipe {
        name: "Chard".to_string(),
        light_days: Some(-1.0),
        ..NewRecipe::default()
    });
    assert!(matches!(negative, Err(StoreError::InvalidRecipe(msg)) if msg.contains("light_days")));
}

#[test]
fn test_recipe_durations_are_bounded() {
    let store = CropStore::open_in_memory().unwrap();

    let huge = store.insert_recipe(&NewRecipe {
        name: "Forever".to_string(),
        germination_days: Some(1e300),
        ..NewRecipe::default()
    });
    assert!(matches!(huge, Err(StoreError::InvalidRecipe(msg)) if msg.contains("germination_days")));

    let too_long = store.insert_recipe(&NewRecipe {
        name: "Decade".to_string(),
        seed_soak_hours: Some(3650.0 * 24.0 + 1.0),
        ..NewRecipe::default()
    });
    assert!(matches!(too_long, Err(StoreError::InvalidRecipe(msg)) if msg.contains("seed_soak_hours")));

    let buffer = store.insert_recipe(&NewRecipe {
        name: "Padded".to_string(),
        buffer_percentage: 5000.0,
        ..NewRecipe::default()
    });
    assert!(matches!(buffer, Err(StoreError::InvalidRecipe(_))));

    let longest = store.insert_recipe(&NewRecipe {
        name: "Slow".to_string(),
        light_days: Some(3650.0),
        ..NewRecipe::default()
    });
    assert!(longest.is_ok());
}

#[test]
fn test_status_of_crop_with_out_of_range_stored_recipe() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crop = store.plant(recipe.id, 1, t0()).unwrap().remove(0);
    let registry = StageRegistry::new();
    let engine = TransitionEngine::new(&store, &registry);
    engine.advance_from_soaking_at(crop.id, "H1", t0()).unwrap();

    // Rows written before durations were bounded
    store
        .conn
        .execute(
            "UPDATE recipes SET germination_days = 1e300 WHERE id = ?1",
            params![recipe.id],
        )
        .unwrap();
    let recipe = store.recipe(recipe.id).unwrap().unwrap();
    let crop = store.crop(crop.id).unwrap().unwrap();

    let status = StageClock::new(&registry).compute_status(&crop, &recipe, t0() + Duration::hours(2));
    assert_eq!(status.time_to_next_stage_minutes, None);
    assert_eq!(status.stage_age_minutes, 120);
    assert_eq!(recipe.expected_harvest_at(t0()), None);
}

#[test]
fn test_plant_creates_soaking_crops() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crops = store.plant(recipe.id, 3, t0()).unwrap();

    assert_eq!(crops.len(), 3);
    for crop in &crops {
        assert_eq!(crop.current_stage, Stage::Soaking);
        assert_eq!(crop.planting_at, t0());
        assert_eq!(crop.soaking_at, Some(t0()));
        assert_eq!(crop.stage_updated_at, t0());
        assert!(crop.tray_number.is_none());
    }

    assert!(matches!(
        store.plant(99, 1, t0()),
        Err(StoreError::RecipeNotFound(99))
    ));
}

#[test]
fn test_batch_members_use_planting_date() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let morning = store
        .plant(recipe.id, 2, t0() - Duration::hours(12))
        .unwrap();
    // Same day, later in the evening
    let evening = store.plant(recipe.id, 1, t0()).unwrap();
    // Next day
    store.plant(recipe.id, 1, t0() + Duration::hours(2)).unwrap();

    let key = morning[0].batch_key();
    assert_eq!(key, evening[0].batch_key());

    let members = store.batch_members(&key).unwrap();
    let ids: Vec<i64> = members.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![morning[0].id, morning[1].id, evening[0].id]);
}

#[test]
fn test_active_batches_group_and_exclude_harvested() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crops = store.plant(recipe.id, 3, t0()).unwrap();
    store.plant(recipe.id, 2, t0() + Duration::days(1)).unwrap();

    let tx = store.begin().unwrap();
    let mut harvested = crops[2].clone();
    harvested.current_stage = Stage::Harvested;
    harvested.harvested_at = Some(t0() + Duration::days(14));
    tx.save_crop(&harvested).unwrap();
    tx.commit().unwrap();

    let batches = store.active_batches().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].crop_count(), 2);
    assert_eq!(batches[0].recipe_name, "Basil");
    assert_eq!(batches[1].crop_count(), 2);
    assert!(batches[0].key.planting_date < batches[1].key.planting_date);
}

#[test]
fn test_crop_filter() {
    let store = CropStore::open_in_memory().unwrap();
    let basil = store.insert_recipe(&basil()).unwrap();
    let radish = store
        .insert_recipe(&NewRecipe {
            name: "Radish".to_string(),
            ..NewRecipe::default()
        })
        .unwrap();
    store.plant(basil.id, 2, t0()).unwrap();
    store.plant(radish.id, 1, t0()).unwrap();

    let filter = CropFilter {
        recipe_id: Some(radish.id),
        ..CropFilter::default()
    };
    assert_eq!(store.crops(&filter).unwrap().len(), 1);

    let filter = CropFilter {
        stage: Some(Stage::Light),
        ..CropFilter::default()
    };
    assert!(store.crops(&filter).unwrap().is_empty());
    assert_eq!(store.crops(&CropFilter::default()).unwrap().len(), 3);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crop = store.plant(recipe.id, 1, t0()).unwrap().remove(0);

    {
        let tx = store.begin().unwrap();
        let mut changed = crop.clone();
        changed.tray_number = Some("Z9".to_string());
        tx.save_crop(&changed).unwrap();
        tx.record_history(&NewHistoryEntry {
            crop_id: crop.id,
            action: HistoryAction::Repair,
            from_stage: None,
            to_stage: None,
            occurred_at: t0(),
            reason: None,
        })
        .unwrap();
        // no commit
    }

    assert_eq!(store.crop(crop.id).unwrap(), Some(crop.clone()));
    assert!(store.history(crop.id).unwrap().is_empty());
}

/// Make SQLite reject any update to one crop
fn reject_updates_of(store: &CropStore, crop_id: i64) {
    store
        .conn
        .execute_batch(&format!(
            "CREATE TRIGGER reject_crop_update BEFORE UPDATE ON crops WHEN NEW.id = {}
             BEGIN SELECT RAISE(ABORT, 'write rejected'); END;",
            crop_id
        ))
        .unwrap();
}

#[test]
fn test_failed_member_write_rolls_back_whole_batch() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crops = store.plant(recipe.id, 3, t0()).unwrap();
    let registry = StageRegistry::new();
    let engine = TransitionEngine::new(&store, &registry);
    for crop in &crops {
        engine
            .advance_from_soaking_at(crop.id, &format!("W{}", crop.id), t0() + Duration::hours(1))
            .unwrap();
    }
    let before: Vec<Crop> = crops
        .iter()
        .map(|c| store.crop(c.id).unwrap().unwrap())
        .collect();

    // The first member is written before the second one fails
    reject_updates_of(&store, crops[1].id);
    let err = engine
        .advance_stage(crops[0].id, t0() + Duration::days(4))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    for (crop, expected) in crops.iter().zip(&before) {
        assert_eq!(store.crop(crop.id).unwrap().as_ref(), Some(expected));
        assert_eq!(store.history(crop.id).unwrap().len(), 1);
    }
}

#[test]
fn test_tray_holder_ignores_harvested_and_self() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crops = store.plant(recipe.id, 2, t0()).unwrap();

    let tx = store.begin().unwrap();
    let mut first = crops[0].clone();
    first.tray_number = Some("A1".to_string());
    tx.save_crop(&first).unwrap();

    assert_eq!(tx.tray_holder("A1", crops[1].id).unwrap(), Some(first.id));
    assert_eq!(tx.tray_holder("A1", first.id).unwrap(), None);

    first.current_stage = Stage::Harvested;
    tx.save_crop(&first).unwrap();
    assert_eq!(tx.tray_holder("A1", crops[1].id).unwrap(), None);
}

#[test]
fn test_history_round_trip() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crop = store.plant(recipe.id, 1, t0()).unwrap().remove(0);

    let tx = store.begin().unwrap();
    tx.record_history(&NewHistoryEntry {
        crop_id: crop.id,
        action: HistoryAction::Revert,
        from_stage: Some(Stage::Blackout),
        to_stage: Some(Stage::Germination),
        occurred_at: t0(),
        reason: Some("moved too early"),
    })
    .unwrap();
    tx.commit().unwrap();

    let history = store.history(crop.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Revert);
    assert_eq!(history[0].from_stage, Some(Stage::Blackout));
    assert_eq!(history[0].occurred_at, t0());
    assert_eq!(history[0].reason.as_deref(), Some("moved too early"));
}

#[test]
fn test_task_schedule_and_deactivate() {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&basil()).unwrap();
    let crops = store.plant(recipe.id, 2, t0()).unwrap();

    store
        .schedule_task(crops[0].id, TaskType::SuspendWatering, t0() + Duration::days(2))
        .unwrap();
    store
        .schedule_task(crops[1].id, TaskType::SuspendWatering, t0() + Duration::days(1))
        .unwrap();

    let tasks = store.tasks(true).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].crop_id, crops[1].id);

    assert_eq!(
        store.deactivate(crops[0].id, TaskType::SuspendWatering).unwrap(),
        1
    );
    // Already inactive
    assert_eq!(
        store.deactivate(crops[0].id, TaskType::SuspendWatering).unwrap(),
        0
    );
    assert_eq!(store.tasks(true).unwrap().len(), 1);
    assert_eq!(store.tasks(false).unwrap().len(), 2);
}
