//! Institution Authority Weights
//!
//! Deterministic weight table for institutional endorsements. The provider
//! estimates a weight per marker, but weights must stay comparable across
//! runs, so the institution/role string is keyword-matched into a fixed
//! table and the table wins whenever the estimate strays too far.

/// Institution categories recognized by the weight table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstitutionKind {
    CourtOfAppeal,
    HighCourt,
    FamilyCourt,
    ExpertWitness,
    CafcassGuardian,
    LocalAuthority,
    Police,
    MedicalProfessional,
    SocialWorker,
    TeacherSchool,
    LayPerson,
    Unknown,
}

impl InstitutionKind {
    /// Keyword-match a free-text institution/role string. Most specific
    /// keywords are checked first so "court of appeal" never falls through
    /// to the generic court bucket.
    pub fn from_label(label: &str) -> Self {
        let l = label.to_lowercase();
        if l.contains("appeal") {
            InstitutionKind::CourtOfAppeal
        } else if l.contains("high court") {
            InstitutionKind::HighCourt
        } else if l.contains("cafcass") || l.contains("guardian") {
            InstitutionKind::CafcassGuardian
        } else if l.contains("social work") {
            InstitutionKind::SocialWorker
        } else if l.contains("local authority") || l.contains("council") {
            InstitutionKind::LocalAuthority
        } else if l.contains("police") || l.contains("constable") {
            InstitutionKind::Police
        } else if l.contains("expert")
            || l.contains("psycholog")
            || l.contains("psychiatr")
        {
            InstitutionKind::ExpertWitness
        } else if l.contains("doctor")
            || l.contains("medical")
            || l.contains("nurse")
            || l.contains("clinic")
            || l.contains("paediatric")
            || l.contains("pediatric")
        {
            InstitutionKind::MedicalProfessional
        } else if l.contains("court") || l.contains("judge") || l.contains("magistrate") {
            InstitutionKind::FamilyCourt
        } else if l.contains("teacher") || l.contains("school") {
            InstitutionKind::TeacherSchool
        } else if l.contains("mother")
            || l.contains("father")
            || l.contains("parent")
            || l.contains("neighbour")
            || l.contains("neighbor")
            || l.contains("lay ")
        {
            InstitutionKind::LayPerson
        } else {
            InstitutionKind::Unknown
        }
    }

    /// Fixed table weight for this institution category
    pub fn table_weight(&self) -> i64 {
        match self {
            InstitutionKind::CourtOfAppeal => 10,
            InstitutionKind::HighCourt => 9,
            InstitutionKind::FamilyCourt => 8,
            InstitutionKind::ExpertWitness => 7,
            InstitutionKind::CafcassGuardian => 7,
            InstitutionKind::LocalAuthority => 6,
            InstitutionKind::Police => 6,
            InstitutionKind::MedicalProfessional => 6,
            InstitutionKind::SocialWorker => 5,
            InstitutionKind::TeacherSchool => 4,
            InstitutionKind::LayPerson => 1,
            InstitutionKind::Unknown => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionKind::CourtOfAppeal => "court_of_appeal",
            InstitutionKind::HighCourt => "high_court",
            InstitutionKind::FamilyCourt => "family_court",
            InstitutionKind::ExpertWitness => "expert_witness",
            InstitutionKind::CafcassGuardian => "cafcass_guardian",
            InstitutionKind::LocalAuthority => "local_authority",
            InstitutionKind::Police => "police",
            InstitutionKind::MedicalProfessional => "medical_professional",
            InstitutionKind::SocialWorker => "social_worker",
            InstitutionKind::TeacherSchool => "teacher_school",
            InstitutionKind::LayPerson => "lay_person",
            InstitutionKind::Unknown => "unknown",
        }
    }
}

/// Reconcile a provider-estimated weight against the table: the estimate
/// (clamped to 1..=10) stands when it is within 2 of the table value,
/// otherwise the table value is used.
pub fn reconcile_weight(provider_weight: i64, institution: &str) -> i64 {
    let table = InstitutionKind::from_label(institution).table_weight();
    let estimate = provider_weight.clamp(1, 10);
    if (estimate - table).abs() > 2 {
        table
    } else {
        estimate
    }
}
