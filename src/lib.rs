//! claimtrace - Claim Lineage Analysis Library
//!
//! Traces how claims propagate through a corpus of case documents and
//! where they pick up institutional authority. A four-phase pipeline
//! (origin identification, propagation tracing, authority accumulation,
//! outcome mapping) runs over SQLite-persisted records, so interrupted
//! runs resume from the first incomplete phase. It includes:
//! - Data models for runs, claims, origins, propagations, markers, outcomes
//! - The pipeline orchestrator and phase handlers
//! - Storage layer (pooled SQLite, lineage repository)
//! - Clustering, authority weighting, and text utilities

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::{
    AnalysisRun, AuthorityMarker, CaseDocument, CaseEntity, CausationChain, Claim, ClaimOrigin,
    ClaimPropagation, RunStatus, SamOutcome, SamPhase, SamResults,
};
pub use services::pipeline::{PipelineConfig, PipelineEvent, PipelineService, RunProgress};
pub use storage::{Database, LineageStore, SqliteLineageStore};
pub use utils::error::{AppError, AppResult};
