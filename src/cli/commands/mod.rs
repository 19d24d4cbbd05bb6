//! CLI command implementations

pub mod batch;
pub mod crop;
pub mod init;
pub mod recipe;
pub mod task;
pub mod utils;
