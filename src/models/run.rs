//! Analysis Run Models
//!
//! State machine types for a pipeline execution: the run record, its
//! status, and the four-phase sequence. Resume logic lives here as a pure
//! function over phase-completion timestamps.

use serde::{Deserialize, Serialize};

/// The four analysis phases, in execution order. Variant order drives the
/// derived ordering, so `Anchor < Inherit < Compound < Arrive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamPhase {
    Anchor,
    Inherit,
    Compound,
    Arrive,
}

impl SamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamPhase::Anchor => "anchor",
            SamPhase::Inherit => "inherit",
            SamPhase::Compound => "compound",
            SamPhase::Arrive => "arrive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "anchor" => Some(SamPhase::Anchor),
            "inherit" => Some(SamPhase::Inherit),
            "compound" => Some(SamPhase::Compound),
            "arrive" => Some(SamPhase::Arrive),
            _ => None,
        }
    }

    /// Status written when this phase starts executing
    pub fn status_running(&self) -> RunStatus {
        match self {
            SamPhase::Anchor => RunStatus::AnchorRunning,
            SamPhase::Inherit => RunStatus::InheritRunning,
            SamPhase::Compound => RunStatus::CompoundRunning,
            SamPhase::Arrive => RunStatus::ArriveRunning,
        }
    }

    /// Status written when this phase finishes
    pub fn status_complete(&self) -> RunStatus {
        match self {
            SamPhase::Anchor => RunStatus::AnchorComplete,
            SamPhase::Inherit => RunStatus::InheritComplete,
            SamPhase::Compound => RunStatus::CompoundComplete,
            SamPhase::Arrive => RunStatus::ArriveComplete,
        }
    }

    /// The phase that follows this one, if any
    pub fn next(&self) -> Option<SamPhase> {
        match self {
            SamPhase::Anchor => Some(SamPhase::Inherit),
            SamPhase::Inherit => Some(SamPhase::Compound),
            SamPhase::Compound => Some(SamPhase::Arrive),
            SamPhase::Arrive => None,
        }
    }

    /// All phases in execution order
    pub fn all() -> [SamPhase; 4] {
        [
            SamPhase::Anchor,
            SamPhase::Inherit,
            SamPhase::Compound,
            SamPhase::Arrive,
        ]
    }
}

impl std::fmt::Display for SamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    AnchorRunning,
    AnchorComplete,
    InheritRunning,
    InheritComplete,
    CompoundRunning,
    CompoundComplete,
    ArriveRunning,
    ArriveComplete,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::AnchorRunning => "anchor_running",
            RunStatus::AnchorComplete => "anchor_complete",
            RunStatus::InheritRunning => "inherit_running",
            RunStatus::InheritComplete => "inherit_complete",
            RunStatus::CompoundRunning => "compound_running",
            RunStatus::CompoundComplete => "compound_complete",
            RunStatus::ArriveRunning => "arrive_running",
            RunStatus::ArriveComplete => "arrive_complete",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "anchor_running" => Some(RunStatus::AnchorRunning),
            "anchor_complete" => Some(RunStatus::AnchorComplete),
            "inherit_running" => Some(RunStatus::InheritRunning),
            "inherit_complete" => Some(RunStatus::InheritComplete),
            "compound_running" => Some(RunStatus::CompoundRunning),
            "compound_complete" => Some(RunStatus::CompoundComplete),
            "arrive_running" => Some(RunStatus::ArriveRunning),
            "arrive_complete" => Some(RunStatus::ArriveComplete),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// The phase currently executing, if any
    pub fn running_phase(&self) -> Option<SamPhase> {
        match self {
            RunStatus::AnchorRunning => Some(SamPhase::Anchor),
            RunStatus::InheritRunning => Some(SamPhase::Inherit),
            RunStatus::CompoundRunning => Some(SamPhase::Compound),
            RunStatus::ArriveRunning => Some(SamPhase::Arrive),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pipeline execution over a case's document set.
///
/// Mutated only by the orchestrator; terminal once completed, failed, or
/// cancelled. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: String,
    pub case_id: String,
    pub status: RunStatus,
    /// Input document ids, in caller-supplied order
    pub document_ids: Vec<String>,
    /// Optional focus filter: clusters matching none of these substrings
    /// are skipped during origin identification
    #[serde(default)]
    pub focus_claims: Vec<String>,
    /// When set, execution stops cleanly after this phase completes
    #[serde(default)]
    pub stop_after_phase: Option<SamPhase>,
    pub anchor_started_at: Option<String>,
    pub anchor_completed_at: Option<String>,
    pub inherit_started_at: Option<String>,
    pub inherit_completed_at: Option<String>,
    pub compound_started_at: Option<String>,
    pub compound_completed_at: Option<String>,
    pub arrive_started_at: Option<String>,
    pub arrive_completed_at: Option<String>,
    #[serde(default)]
    pub false_premises_found: u32,
    #[serde(default)]
    pub propagation_chains_found: u32,
    #[serde(default)]
    pub authority_accumulations_found: u32,
    #[serde(default)]
    pub outcomes_linked: u32,
    pub error_message: Option<String>,
    pub error_phase: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AnalysisRun {
    /// Create a new pending run for a case and document set
    pub fn new(case_id: impl Into<String>, document_ids: Vec<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            status: RunStatus::Pending,
            document_ids,
            focus_claims: Vec::new(),
            stop_after_phase: None,
            anchor_started_at: None,
            anchor_completed_at: None,
            inherit_started_at: None,
            inherit_completed_at: None,
            compound_started_at: None,
            compound_completed_at: None,
            arrive_started_at: None,
            arrive_completed_at: None,
            false_premises_found: 0,
            propagation_chains_found: 0,
            authority_accumulations_found: 0,
            outcomes_linked: 0,
            error_message: None,
            error_phase: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Restrict origin identification to claims containing these substrings
    pub fn with_focus_claims(mut self, focus_claims: Vec<String>) -> Self {
        self.focus_claims = focus_claims;
        self
    }

    /// Stop cleanly once the given phase has completed
    pub fn with_stop_after(mut self, phase: SamPhase) -> Self {
        self.stop_after_phase = Some(phase);
        self
    }

    /// Completion timestamp for a phase
    pub fn phase_completed_at(&self, phase: SamPhase) -> Option<&str> {
        match phase {
            SamPhase::Anchor => self.anchor_completed_at.as_deref(),
            SamPhase::Inherit => self.inherit_completed_at.as_deref(),
            SamPhase::Compound => self.compound_completed_at.as_deref(),
            SamPhase::Arrive => self.arrive_completed_at.as_deref(),
        }
    }

    /// Start timestamp for a phase
    pub fn phase_started_at(&self, phase: SamPhase) -> Option<&str> {
        match phase {
            SamPhase::Anchor => self.anchor_started_at.as_deref(),
            SamPhase::Inherit => self.inherit_started_at.as_deref(),
            SamPhase::Compound => self.compound_started_at.as_deref(),
            SamPhase::Arrive => self.arrive_started_at.as_deref(),
        }
    }

    /// The first phase whose completion timestamp is unset, or None when
    /// all four phases have completed. This is the resume decision: pure,
    /// derived only from persisted timestamps.
    pub fn next_phase(&self) -> Option<SamPhase> {
        SamPhase::all()
            .into_iter()
            .find(|phase| self.phase_completed_at(*phase).is_none())
    }

    /// Whether the run can be resumed (not already finished cleanly)
    pub fn is_resumable(&self) -> bool {
        self.status != RunStatus::Completed
    }
}
