//! Analysis Pipeline
//!
//! The four-phase claim lineage pipeline and its orchestrator:
//! - **ANCHOR**: extract claims, cluster near-duplicates, identify origins
//! - **INHERIT**: walk each origin forward through later documents
//! - **COMPOUND**: score accumulated institutional authority per chain
//! - **ARRIVE**: link outcomes back to false premises with but-for causation
//!
//! Phases run strictly in order; each reads its predecessors' persisted
//! rows, which is what makes interrupted runs resumable.

pub mod anchor;
pub mod arrive;
pub mod compound;
pub mod context;
pub mod inherit;
pub mod service;

pub use context::{
    AnchorOutput, ArriveOutput, CompoundOutput, InheritOutput, PhaseContext, PhaseResults,
    PipelineConfig, PipelineEvent, RunProgress,
};
pub use service::PipelineService;
