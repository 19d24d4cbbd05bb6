//! growline: crop stage lifecycle tracking for microgreen production
//!
//! Crops move through soaking, germination, blackout, light and harvest in
//! batches. The library tracks each crop's stage timestamps in SQLite and
//! derives its status from them at read time.

pub mod cli;
pub mod core;
pub mod entities;
