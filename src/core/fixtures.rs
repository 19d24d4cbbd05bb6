//! Shared fixtures for unit tests

use chrono::{DateTime, TimeZone, Utc};

use crate::core::store::CropStore;
use crate::core::transition::TransitionEngine;
use crate::entities::{Crop, NewRecipe, Recipe};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

/// Germination 3 days, blackout 2 days, light 7 days, no soak
pub fn sunflower() -> NewRecipe {
    NewRecipe {
        name: "Sunflower".to_string(),
        germination_days: Some(3.0),
        blackout_days: Some(2.0),
        light_days: Some(7.0),
        seed_soak_hours: None,
        days_to_maturity: Some(12.0),
        buffer_percentage: 10.0,
    }
}

/// In-memory store with one recipe and `count` crops planted at [`t0`]
pub fn planted_store(count: u32) -> (CropStore, Recipe, Vec<Crop>) {
    let store = CropStore::open_in_memory().unwrap();
    let recipe = store.insert_recipe(&sunflower()).unwrap();
    let crops = store.plant(recipe.id, count, t0()).unwrap();
    (store, recipe, crops)
}

/// Move every crop out of soaking with tray numbers `T<id>`
pub fn exit_soaking_all(engine: &TransitionEngine<'_>, crops: &[Crop], at: DateTime<Utc>) {
    for crop in crops {
        engine
            .advance_from_soaking_at(crop.id, &format!("T{}", crop.id), at)
            .unwrap();
    }
}
