//! Case Document Models
//!
//! Read-only inputs to the pipeline: documents with pre-extracted text and
//! the case's known entities. Ingestion and OCR happen upstream.

use serde::{Deserialize, Serialize};

/// Forensic classification of a case document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    CourtOrder,
    WitnessStatement,
    ExpertReport,
    PoliceBundle,
    SocialWorkAssessment,
    Transcript,
    Correspondence,
    Media,
    Disclosure,
    ThresholdDocument,
    PositionStatement,
    Other,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::CourtOrder => "court_order",
            DocType::WitnessStatement => "witness_statement",
            DocType::ExpertReport => "expert_report",
            DocType::PoliceBundle => "police_bundle",
            DocType::SocialWorkAssessment => "social_work_assessment",
            DocType::Transcript => "transcript",
            DocType::Correspondence => "correspondence",
            DocType::Media => "media",
            DocType::Disclosure => "disclosure",
            DocType::ThresholdDocument => "threshold_document",
            DocType::PositionStatement => "position_statement",
            DocType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "court_order" => Some(DocType::CourtOrder),
            "witness_statement" => Some(DocType::WitnessStatement),
            "expert_report" => Some(DocType::ExpertReport),
            "police_bundle" => Some(DocType::PoliceBundle),
            "social_work_assessment" => Some(DocType::SocialWorkAssessment),
            "transcript" => Some(DocType::Transcript),
            "correspondence" => Some(DocType::Correspondence),
            "media" => Some(DocType::Media),
            "disclosure" => Some(DocType::Disclosure),
            "threshold_document" => Some(DocType::ThresholdDocument),
            "position_statement" => Some(DocType::PositionStatement),
            "other" => Some(DocType::Other),
            _ => None,
        }
    }

    /// Types that plausibly record a consequential decision
    pub fn is_decision_bearing(&self) -> bool {
        matches!(
            self,
            DocType::CourtOrder
                | DocType::ExpertReport
                | DocType::ThresholdDocument
                | DocType::SocialWorkAssessment
                | DocType::Media
        )
    }
}

/// A case document with pre-extracted text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: String,
    pub case_id: String,
    pub filename: String,
    pub doc_type: Option<DocType>,
    /// Document date used for chain ordering (RFC 3339 or YYYY-MM-DD)
    pub doc_date: String,
    /// Party or institution the document came from
    pub source_entity: Option<String>,
    pub extracted_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CaseDocument {
    pub fn new(
        case_id: impl Into<String>,
        filename: impl Into<String>,
        doc_date: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            filename: filename.into(),
            doc_type: None,
            doc_date: doc_date.into(),
            source_entity: None,
            extracted_text: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn with_extracted_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    pub fn with_source_entity(mut self, entity: impl Into<String>) -> Self {
        self.source_entity = Some(entity.into());
        self
    }

    /// Whether ARRIVE should scan this document for outcomes: a
    /// decision-bearing type, or an undetermined one (unset / other)
    pub fn may_bear_outcomes(&self) -> bool {
        match self.doc_type {
            None | Some(DocType::Other) => true,
            Some(doc_type) => doc_type.is_decision_bearing(),
        }
    }

    pub fn has_text(&self) -> bool {
        self.extracted_text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A person or institution known to the case, carried read-only into
/// analysis prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEntity {
    pub id: String,
    pub case_id: String,
    pub name: String,
    pub role: Option<String>,
    pub created_at: String,
}

impl CaseEntity {
    pub fn new(case_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            name: name.into(),
            role: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
