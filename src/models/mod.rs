//! Data Models
//!
//! Contains all data structures used throughout the application.

pub mod authority;
pub mod claim;
pub mod document;
pub mod outcome;
pub mod results;
pub mod run;

pub use authority::*;
pub use claim::*;
pub use document::*;
pub use outcome::*;
pub use results::*;
pub use run::*;
