//! `roster-io` — Storage and file formats for roster ingestion.
//!
//! SQLite enrollment store and site registry, CSV registry import and XLSX
//! export of cleaned rows.

pub mod csv;
pub mod store;
pub mod xlsx;

pub use store::{SqliteSiteRegistry, SqliteStore};

/// Schema version of the enrollment database.
/// Increment when the tables change in a way older builds can't read
pub const SCHEMA_VERSION: u32 = 1;
