//! Services
//!
//! Business logic for claim lineage analysis: text clustering, the
//! institutional authority table, and the four-phase pipeline.

pub mod authority;
pub mod clustering;
pub mod pipeline;

pub use authority::{reconcile_weight, InstitutionKind};
pub use clustering::{cluster_claims, ClaimCluster};
pub use pipeline::{PipelineConfig, PipelineEvent, PipelineService, RunProgress};
