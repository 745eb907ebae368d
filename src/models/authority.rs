//! Authority Models
//!
//! Endorsement events recorded by the COMPOUND phase. Markers for a claim
//! are ordered chronologically; once the claim's chain is fully scored they
//! all carry the chain's final cumulative score.

use serde::{Deserialize, Serialize};

/// Category of institutional endorsement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
    CourtFinding,
    ExpertOpinion,
    OfficialReport,
    #[default]
    ProfessionalAssessment,
    PoliceConclusion,
    AgencyDetermination,
}

impl AuthorityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityType::CourtFinding => "court_finding",
            AuthorityType::ExpertOpinion => "expert_opinion",
            AuthorityType::OfficialReport => "official_report",
            AuthorityType::ProfessionalAssessment => "professional_assessment",
            AuthorityType::PoliceConclusion => "police_conclusion",
            AuthorityType::AgencyDetermination => "agency_determination",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "court_finding" => Some(AuthorityType::CourtFinding),
            "expert_opinion" => Some(AuthorityType::ExpertOpinion),
            "official_report" => Some(AuthorityType::OfficialReport),
            "professional_assessment" => Some(AuthorityType::ProfessionalAssessment),
            "police_conclusion" => Some(AuthorityType::PoliceConclusion),
            "agency_determination" => Some(AuthorityType::AgencyDetermination),
            _ => None,
        }
    }
}

/// How the endorsing document took the claim on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementType {
    ExplicitAdoption,
    ImplicitReliance,
    QualifiedAcceptance,
    #[default]
    ReferencedWithoutVerification,
}

impl EndorsementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndorsementType::ExplicitAdoption => "explicit_adoption",
            EndorsementType::ImplicitReliance => "implicit_reliance",
            EndorsementType::QualifiedAcceptance => "qualified_acceptance",
            EndorsementType::ReferencedWithoutVerification => "referenced_without_verification",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "explicit_adoption" => Some(EndorsementType::ExplicitAdoption),
            "implicit_reliance" => Some(EndorsementType::ImplicitReliance),
            "qualified_acceptance" => Some(EndorsementType::QualifiedAcceptance),
            "referenced_without_verification" => {
                Some(EndorsementType::ReferencedWithoutVerification)
            }
            _ => None,
        }
    }
}

/// One endorsement event for a claim by an institutional actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityMarker {
    pub id: String,
    pub case_id: String,
    pub claim_id: String,
    pub document_id: String,
    pub authority_date: String,
    /// Institution/role string as detected, before table reconciliation
    pub institution: String,
    pub authority_type: AuthorityType,
    /// Reconciled weight, 1 to 10
    pub authority_weight: i64,
    pub endorsement_type: EndorsementType,
    pub is_authority_laundering: bool,
    /// Human-readable reason when the laundering flag is set
    pub laundering_reason: Option<String>,
    /// Final cumulative authority for the claim's whole chain
    pub cumulative_score: i64,
    pub created_at: String,
}
