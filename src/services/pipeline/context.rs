//! Pipeline Context & Phase Outputs
//!
//! Shared state handed to every phase handler, the tunable thresholds, and
//! the typed outputs each phase produces. Later phases receive earlier
//! outputs through `PhaseResults`, whose `require_*` accessors turn a
//! missing predecessor into a typed error instead of a panic.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::{
    AnalysisRun, AuthorityMarker, CaseDocument, CaseEntity, CausationChain, ClaimOrigin,
    ClaimPropagation, SamOutcome, SamPhase,
};
use crate::storage::LineageStore;
use crate::utils::error::{AppError, AppResult};
use crate::utils::text::truncate_chars;
use claimtrace_analysis::AnalysisProvider;

/// Tunable thresholds for the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Jaccard similarity above which two claims join the same cluster
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Normalized-prefix length used as a cluster comparison key
    #[serde(default = "default_cluster_prefix_len")]
    pub cluster_prefix_len: usize,
    /// Normalized-prefix length for outcome-to-premise overlap matching
    #[serde(default = "default_overlap_prefix_len")]
    pub overlap_prefix_len: usize,
    /// Document text is truncated to this many characters per provider call
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
    /// Maximum parallel provider calls within a phase
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_cluster_prefix_len() -> usize {
    200
}

fn default_overlap_prefix_len() -> usize {
    80
}

fn default_max_document_chars() -> usize {
    6000
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            cluster_prefix_len: default_cluster_prefix_len(),
            overlap_prefix_len: default_overlap_prefix_len(),
            max_document_chars: default_max_document_chars(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl PipelineConfig {
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_max_document_chars(mut self, chars: usize) -> Self {
        self.max_document_chars = chars;
        self
    }

    pub fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency.max(1);
        self
    }
}

/// Everything a phase handler needs, built once per execution
pub struct PhaseContext {
    pub run_id: String,
    pub case_id: String,
    /// Run's input documents, sorted by document date ascending
    pub documents: Vec<CaseDocument>,
    /// Case entities, carried read-only into prompts
    pub entities: Vec<CaseEntity>,
    /// Substring filter restricting origin identification, empty = no filter
    pub focus_claims: Vec<String>,
    pub config: PipelineConfig,
    pub provider: Arc<dyn AnalysisProvider>,
    pub store: Arc<dyn LineageStore>,
    pub cancel: CancellationToken,
}

impl PhaseContext {
    /// Look up a run document by id
    pub fn document(&self, id: &str) -> Option<&CaseDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Bail out with a cancellation error when the run's token has fired
    pub fn check_cancelled(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Document text truncated to the configured per-call limit
    pub fn document_excerpt(&self, document: &CaseDocument) -> String {
        truncate_chars(
            document.extracted_text.as_deref().unwrap_or(""),
            self.config.max_document_chars,
        )
    }

    /// One-line-per-entity context block for prompts, empty string when the
    /// case has no recorded entities
    pub fn entity_summary(&self) -> String {
        if self.entities.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .entities
            .iter()
            .map(|e| match &e.role {
                Some(role) => format!("- {} ({})", e.name, role),
                None => format!("- {}", e.name),
            })
            .collect();
        format!("KNOWN CASE ENTITIES:\n{}\n\n", lines.join("\n"))
    }
}

/// ANCHOR output: identified origins and extraction stats
#[derive(Debug, Clone, Default)]
pub struct AnchorOutput {
    /// One origin per surviving cluster, ordered by origin date
    pub origins: Vec<ClaimOrigin>,
    /// Total claims extracted across all documents
    pub claims_analyzed: u32,
    /// Mean origin confidence, rounded to two decimals, 0.0 when no origins
    pub aggregate_confidence: f64,
}

impl AnchorOutput {
    pub fn false_premise_count(&self) -> u32 {
        self.origins.iter().filter(|o| o.is_false_premise).count() as u32
    }
}

/// INHERIT output: propagation hops and the chain count
#[derive(Debug, Clone, Default)]
pub struct InheritOutput {
    pub propagations: Vec<ClaimPropagation>,
    /// Distinct origin claims with at least one propagation
    pub chains_found: u32,
}

/// COMPOUND output: markers and each claim's final cumulative authority
#[derive(Debug, Clone, Default)]
pub struct CompoundOutput {
    pub markers: Vec<AuthorityMarker>,
    pub final_scores: HashMap<String, i64>,
}

/// ARRIVE output: persisted outcomes plus derived causation chains
#[derive(Debug, Clone, Default)]
pub struct ArriveOutput {
    pub outcomes: Vec<SamOutcome>,
    pub causation_chains: Vec<CausationChain>,
}

/// Accumulated phase outputs for one execution. Completed phases are
/// re-loaded from the store on resume; the `require_*` accessors give
/// later phases typed access to their prerequisites.
#[derive(Debug, Clone, Default)]
pub struct PhaseResults {
    pub anchor: Option<AnchorOutput>,
    pub inherit: Option<InheritOutput>,
    pub compound: Option<CompoundOutput>,
    pub arrive: Option<ArriveOutput>,
}

impl PhaseResults {
    pub fn require_anchor(&self) -> AppResult<&AnchorOutput> {
        self.anchor.as_ref().ok_or_else(|| {
            AppError::invalid_state("origin identification results are required but missing")
        })
    }

    pub fn require_inherit(&self) -> AppResult<&InheritOutput> {
        self.inherit.as_ref().ok_or_else(|| {
            AppError::invalid_state("propagation results are required but missing")
        })
    }

    pub fn require_compound(&self) -> AppResult<&CompoundOutput> {
        self.compound.as_ref().ok_or_else(|| {
            AppError::invalid_state("authority results are required but missing")
        })
    }
}

/// Progress snapshot for polling callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub run: AnalysisRun,
    /// Phase currently executing, derived from the run status
    pub current_phase: Option<SamPhase>,
    /// First phase a resume would execute, None when all four completed
    pub next_phase: Option<SamPhase>,
}

impl RunProgress {
    pub fn from_run(run: AnalysisRun) -> Self {
        let current_phase = run.status.running_phase();
        let next_phase = run.next_phase();
        Self {
            run,
            current_phase,
            next_phase,
        }
    }
}

/// Lifecycle notifications emitted best-effort while a run executes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PhaseStarted {
        run_id: String,
        phase: SamPhase,
    },
    PhaseCompleted {
        run_id: String,
        phase: SamPhase,
    },
    RunCompleted {
        run_id: String,
    },
    RunFailed {
        run_id: String,
        phase: SamPhase,
        message: String,
    },
    RunCancelled {
        run_id: String,
    },
}
