//! Storage Layer
//!
//! Handles all data persistence: the pooled SQLite database and the lineage
//! repository the pipeline is injected with.

pub mod database;
pub mod store;

pub use database::*;
pub use store::*;
