//! Claim Lineage Models
//!
//! Claims, their origins, and their propagation records. A Claim is
//! immutable once persisted: later mentions create ClaimPropagation rows,
//! never claim mutation.

use serde::{Deserialize, Serialize};

/// Category of an extracted claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    #[default]
    Factual,
    Opinion,
    Finding,
    Recommendation,
    Conclusion,
    Allegation,
}

impl ClaimCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimCategory::Factual => "factual",
            ClaimCategory::Opinion => "opinion",
            ClaimCategory::Finding => "finding",
            ClaimCategory::Recommendation => "recommendation",
            ClaimCategory::Conclusion => "conclusion",
            ClaimCategory::Allegation => "allegation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "factual" => Some(ClaimCategory::Factual),
            "opinion" => Some(ClaimCategory::Opinion),
            "finding" => Some(ClaimCategory::Finding),
            "recommendation" => Some(ClaimCategory::Recommendation),
            "conclusion" => Some(ClaimCategory::Conclusion),
            "allegation" => Some(ClaimCategory::Allegation),
            _ => None,
        }
    }
}

/// Declared foundation strength of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimFoundation {
    Verified,
    Supported,
    #[default]
    Unsupported,
    Contested,
    Circular,
    Contaminated,
    Unfounded,
}

impl ClaimFoundation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimFoundation::Verified => "verified",
            ClaimFoundation::Supported => "supported",
            ClaimFoundation::Unsupported => "unsupported",
            ClaimFoundation::Contested => "contested",
            ClaimFoundation::Circular => "circular",
            ClaimFoundation::Contaminated => "contaminated",
            ClaimFoundation::Unfounded => "unfounded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "verified" => Some(ClaimFoundation::Verified),
            "supported" => Some(ClaimFoundation::Supported),
            "unsupported" => Some(ClaimFoundation::Unsupported),
            "contested" => Some(ClaimFoundation::Contested),
            "circular" => Some(ClaimFoundation::Circular),
            "contaminated" => Some(ClaimFoundation::Contaminated),
            "unfounded" => Some(ClaimFoundation::Unfounded),
            _ => None,
        }
    }
}

/// A substantive assertion extracted from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub case_id: String,
    pub text: String,
    /// Asserting author, when identifiable
    pub author: Option<String>,
    pub category: ClaimCategory,
    pub foundation: ClaimFoundation,
    pub source_document_id: String,
    pub created_at: String,
}

impl Claim {
    pub fn new(
        case_id: impl Into<String>,
        text: impl Into<String>,
        source_document_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            text: text.into(),
            author: None,
            category: ClaimCategory::default(),
            foundation: ClaimFoundation::default(),
            source_document_id: source_document_id.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// How a claim entered the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    PrimarySource,
    #[default]
    ProfessionalOpinion,
    Hearsay,
    Speculation,
    Misattribution,
    Fabrication,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginType::PrimarySource => "primary_source",
            OriginType::ProfessionalOpinion => "professional_opinion",
            OriginType::Hearsay => "hearsay",
            OriginType::Speculation => "speculation",
            OriginType::Misattribution => "misattribution",
            OriginType::Fabrication => "fabrication",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "primary_source" => Some(OriginType::PrimarySource),
            "professional_opinion" => Some(OriginType::ProfessionalOpinion),
            "hearsay" => Some(OriginType::Hearsay),
            "speculation" => Some(OriginType::Speculation),
            "misattribution" => Some(OriginType::Misattribution),
            "fabrication" => Some(OriginType::Fabrication),
            _ => None,
        }
    }

    /// Origin types with no evidential grounding. Authority accumulated on
    /// top of these is suspect.
    pub fn is_tainted(&self) -> bool {
        matches!(
            self,
            OriginType::Speculation | OriginType::Hearsay | OriginType::Fabrication
        )
    }
}

/// Why an origin is judged a false premise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalsePremiseType {
    FactualError,
    Misattribution,
    SpeculationAsFact,
    ContextStripping,
    SelectiveQuotation,
    TemporalDistortion,
}

impl FalsePremiseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FalsePremiseType::FactualError => "factual_error",
            FalsePremiseType::Misattribution => "misattribution",
            FalsePremiseType::SpeculationAsFact => "speculation_as_fact",
            FalsePremiseType::ContextStripping => "context_stripping",
            FalsePremiseType::SelectiveQuotation => "selective_quotation",
            FalsePremiseType::TemporalDistortion => "temporal_distortion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "factual_error" => Some(FalsePremiseType::FactualError),
            "misattribution" => Some(FalsePremiseType::Misattribution),
            "speculation_as_fact" => Some(FalsePremiseType::SpeculationAsFact),
            "context_stripping" => Some(FalsePremiseType::ContextStripping),
            "selective_quotation" => Some(FalsePremiseType::SelectiveQuotation),
            "temporal_distortion" => Some(FalsePremiseType::TemporalDistortion),
            _ => None,
        }
    }
}

/// The earliest documented appearance of a claim cluster.
/// One-to-one with its claim; read-only after ANCHOR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimOrigin {
    pub id: String,
    pub case_id: String,
    pub claim_id: String,
    pub origin_document_id: String,
    pub origin_date: String,
    /// Excerpt of the surrounding text where the claim first appears
    pub origin_context: Option<String>,
    pub origin_type: OriginType,
    pub is_false_premise: bool,
    pub false_premise_type: Option<FalsePremiseType>,
    pub contradicting_evidence: Option<String>,
    pub confidence_score: f64,
    pub created_at: String,
}

/// How a claim was carried from one document into a later one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMechanism {
    Verbatim,
    #[default]
    Paraphrase,
    Citation,
    ImplicitAdoption,
    CircularReference,
    AuthorityAppeal,
}

impl PropagationMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationMechanism::Verbatim => "verbatim",
            PropagationMechanism::Paraphrase => "paraphrase",
            PropagationMechanism::Citation => "citation",
            PropagationMechanism::ImplicitAdoption => "implicit_adoption",
            PropagationMechanism::CircularReference => "circular_reference",
            PropagationMechanism::AuthorityAppeal => "authority_appeal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "verbatim" => Some(PropagationMechanism::Verbatim),
            "paraphrase" => Some(PropagationMechanism::Paraphrase),
            "citation" => Some(PropagationMechanism::Citation),
            "implicit_adoption" => Some(PropagationMechanism::ImplicitAdoption),
            "circular_reference" => Some(PropagationMechanism::CircularReference),
            "authority_appeal" => Some(PropagationMechanism::AuthorityAppeal),
            _ => None,
        }
    }
}

/// How the claim's content shifted at a propagation hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationType {
    Amplification,
    Attenuation,
    CertaintyDrift,
    AttributionShift,
    ScopeExpansion,
    ScopeContraction,
}

impl MutationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationType::Amplification => "amplification",
            MutationType::Attenuation => "attenuation",
            MutationType::CertaintyDrift => "certainty_drift",
            MutationType::AttributionShift => "attribution_shift",
            MutationType::ScopeExpansion => "scope_expansion",
            MutationType::ScopeContraction => "scope_contraction",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "amplification" => Some(MutationType::Amplification),
            "attenuation" => Some(MutationType::Attenuation),
            "certainty_drift" => Some(MutationType::CertaintyDrift),
            "attribution_shift" => Some(MutationType::AttributionShift),
            "scope_expansion" => Some(MutationType::ScopeExpansion),
            "scope_contraction" => Some(MutationType::ScopeContraction),
            _ => None,
        }
    }
}

/// One observed transmission of a claim between documents.
/// Target date is strictly later than source date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimPropagation {
    pub id: String,
    pub case_id: String,
    /// The origin claim whose chain this hop belongs to
    pub claim_id: String,
    pub source_document_id: String,
    pub source_date: String,
    pub target_document_id: String,
    pub target_date: String,
    pub mechanism: PropagationMechanism,
    pub verification_performed: bool,
    pub verification_method: Option<String>,
    pub verification_outcome: Option<String>,
    pub crossed_institutional_boundary: bool,
    pub mutation_detected: bool,
    pub mutation_type: Option<MutationType>,
    /// Claim text as carried into this hop
    pub original_text: Option<String>,
    /// Claim text as it appears in the target document, when mutated
    pub mutated_text: Option<String>,
    pub created_at: String,
}

impl ClaimPropagation {
    /// The text the walk carries forward after this hop
    pub fn carried_text(&self) -> Option<&str> {
        self.mutated_text.as_deref().or(self.original_text.as_deref())
    }
}
