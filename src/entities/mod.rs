//! Entity type definitions

pub mod crop;
pub mod recipe;

pub use crop::{Batch, BatchKey, Crop};
pub use recipe::{NewRecipe, Recipe};
