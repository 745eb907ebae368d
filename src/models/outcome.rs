//! Outcome Models
//!
//! Consequential decisions traced back to false premises by the ARRIVE
//! phase, plus the derived causation-chain view.

use serde::{Deserialize, Serialize};

/// Kind of consequential decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    CourtOrder,
    FindingOfFact,
    #[default]
    Recommendation,
    AgencyDecision,
    RegulatoryAction,
    MediaPublication,
}

impl OutcomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeType::CourtOrder => "court_order",
            OutcomeType::FindingOfFact => "finding_of_fact",
            OutcomeType::Recommendation => "recommendation",
            OutcomeType::AgencyDecision => "agency_decision",
            OutcomeType::RegulatoryAction => "regulatory_action",
            OutcomeType::MediaPublication => "media_publication",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "court_order" => Some(OutcomeType::CourtOrder),
            "finding_of_fact" => Some(OutcomeType::FindingOfFact),
            "recommendation" => Some(OutcomeType::Recommendation),
            "agency_decision" => Some(OutcomeType::AgencyDecision),
            "regulatory_action" => Some(OutcomeType::RegulatoryAction),
            "media_publication" => Some(OutcomeType::MediaPublication),
            _ => None,
        }
    }
}

/// Severity of the harm an outcome caused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HarmLevel {
    Catastrophic,
    Severe,
    #[default]
    Moderate,
    Minor,
}

impl HarmLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarmLevel::Catastrophic => "catastrophic",
            HarmLevel::Severe => "severe",
            HarmLevel::Moderate => "moderate",
            HarmLevel::Minor => "minor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "catastrophic" => Some(HarmLevel::Catastrophic),
            "severe" => Some(HarmLevel::Severe),
            "moderate" => Some(HarmLevel::Moderate),
            "minor" => Some(HarmLevel::Minor),
            _ => None,
        }
    }
}

/// Would the outcome have occurred absent the false premise?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButForVerdict {
    DefinitelyNot,
    ProbablyNot,
    #[default]
    Uncertain,
    ProbablyYes,
    DefinitelyYes,
}

impl ButForVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButForVerdict::DefinitelyNot => "definitely_not",
            ButForVerdict::ProbablyNot => "probably_not",
            ButForVerdict::Uncertain => "uncertain",
            ButForVerdict::ProbablyYes => "probably_yes",
            ButForVerdict::DefinitelyYes => "definitely_yes",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "definitely_not" => Some(ButForVerdict::DefinitelyNot),
            "probably_not" => Some(ButForVerdict::ProbablyNot),
            "uncertain" => Some(ButForVerdict::Uncertain),
            "probably_yes" => Some(ButForVerdict::ProbablyYes),
            "definitely_yes" => Some(ButForVerdict::DefinitelyYes),
            _ => None,
        }
    }
}

/// A consequential decision traced back to one or more false premises
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamOutcome {
    pub id: String,
    pub case_id: String,
    pub document_id: String,
    pub outcome_type: OutcomeType,
    pub description: String,
    pub outcome_date: Option<String>,
    pub harm_level: HarmLevel,
    pub harm_description: Option<String>,
    /// Claim texts the provider identified as supporting the outcome
    pub supporting_claims: Vec<String>,
    /// Claim ids of the false premises matched to this outcome
    pub root_claim_ids: Vec<String>,
    pub but_for_verdict: ButForVerdict,
    /// Narrative explanation of the but-for assessment
    pub but_for_analysis: Option<String>,
    pub causation_confidence: f64,
    pub remediation_possible: bool,
    pub remediation_actions: Vec<String>,
    pub created_at: String,
}

/// Derived, never persisted: one outcome paired with the document-hop path
/// its root claims took to reach it, and their summed final authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausationChain {
    pub outcome_id: String,
    pub root_claim_ids: Vec<String>,
    /// Hops rendered as "source-doc -> target-doc (mechanism)"
    pub propagation_path: Vec<String>,
    pub authority_accumulation: i64,
}
