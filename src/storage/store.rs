//! Lineage Store
//!
//! Repository interface over the lineage tables, injected into the
//! orchestrator and phase handlers so the pipeline never reaches for an
//! ambient database handle. All result writes are upserts keyed by each
//! table's natural unique key, so re-running a phase never duplicates rows.

use rusqlite::{params, params_from_iter, Row};

use crate::models::{
    AnalysisRun, AuthorityMarker, AuthorityType, ButForVerdict, CaseDocument, CaseEntity, Claim,
    ClaimCategory, ClaimFoundation, ClaimOrigin, ClaimPropagation, DocType, EndorsementType,
    FalsePremiseType, HarmLevel, MutationType, OriginType, OutcomeType, PropagationMechanism,
    RunStatus, SamOutcome, SamPhase,
};
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

/// Persistence operations the pipeline depends on
pub trait LineageStore: Send + Sync {
    // Documents and entities (read-mostly inputs)
    fn insert_document(&self, document: &CaseDocument) -> AppResult<()>;
    fn get_documents(&self, case_id: &str, ids: &[String]) -> AppResult<Vec<CaseDocument>>;
    fn insert_entity(&self, entity: &CaseEntity) -> AppResult<()>;
    fn get_entities(&self, case_id: &str) -> AppResult<Vec<CaseEntity>>;

    // Analysis runs
    fn insert_run(&self, run: &AnalysisRun) -> AppResult<()>;
    fn get_run(&self, run_id: &str) -> AppResult<AnalysisRun>;
    fn set_run_status(&self, run_id: &str, status: RunStatus) -> AppResult<()>;
    fn set_phase_started(&self, run_id: &str, phase: SamPhase) -> AppResult<()>;
    fn set_phase_completed(&self, run_id: &str, phase: SamPhase) -> AppResult<()>;
    fn set_phase_counter(&self, run_id: &str, phase: SamPhase, count: u32) -> AppResult<()>;
    fn set_run_completed(&self, run_id: &str) -> AppResult<()>;
    fn set_run_failed(&self, run_id: &str, phase: SamPhase, message: &str) -> AppResult<()>;
    /// Returns false when the run was already terminal
    fn set_run_cancelled(&self, run_id: &str) -> AppResult<bool>;

    // Claims
    /// Insert the claim unless a near-duplicate (same normalized text)
    /// already exists; returns the canonical row either way.
    fn upsert_claim(&self, claim: &Claim, normalized_text: &str) -> AppResult<Claim>;
    fn get_claims(&self, case_id: &str) -> AppResult<Vec<Claim>>;

    // Origins
    fn upsert_origin(&self, origin: &ClaimOrigin) -> AppResult<()>;
    fn get_origins(&self, case_id: &str) -> AppResult<Vec<ClaimOrigin>>;

    // Propagations
    fn upsert_propagation(&self, propagation: &ClaimPropagation) -> AppResult<()>;
    fn get_propagations(&self, case_id: &str) -> AppResult<Vec<ClaimPropagation>>;
    fn get_propagations_for_claim(&self, claim_id: &str) -> AppResult<Vec<ClaimPropagation>>;

    // Authority markers
    fn upsert_marker(&self, marker: &AuthorityMarker) -> AppResult<()>;
    fn get_markers(&self, case_id: &str) -> AppResult<Vec<AuthorityMarker>>;
    fn get_markers_for_claim(&self, claim_id: &str) -> AppResult<Vec<AuthorityMarker>>;
    /// Write the chain's final cumulative score onto every marker of a claim
    fn set_final_cumulative_score(&self, claim_id: &str, score: i64) -> AppResult<()>;

    // Outcomes
    /// Insert or refresh an outcome keyed by document and description;
    /// the canonical row keeps its original id across re-runs.
    fn upsert_outcome(&self, outcome: &SamOutcome) -> AppResult<SamOutcome>;
    fn get_outcomes(&self, case_id: &str) -> AppResult<Vec<SamOutcome>>;
}

/// SQLite-backed implementation of the lineage store
#[derive(Clone)]
pub struct SqliteLineageStore {
    db: Database,
}

impl SqliteLineageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn invalid_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value: {value}").into(),
    )
}

fn parse_json_list(idx: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn json_list(values: &[String]) -> AppResult<String> {
    Ok(serde_json::to_string(values)?)
}

fn map_document(row: &Row<'_>) -> rusqlite::Result<CaseDocument> {
    let doc_type: Option<String> = row.get(3)?;
    let doc_type = match doc_type {
        Some(raw) => Some(DocType::from_str(&raw).ok_or_else(|| invalid_column(3, &raw))?),
        None => None,
    };
    Ok(CaseDocument {
        id: row.get(0)?,
        case_id: row.get(1)?,
        filename: row.get(2)?,
        doc_type,
        doc_date: row.get(4)?,
        source_entity: row.get(5)?,
        extracted_text: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_entity(row: &Row<'_>) -> rusqlite::Result<CaseEntity> {
    Ok(CaseEntity {
        id: row.get(0)?,
        case_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<AnalysisRun> {
    let status_raw: String = row.get(2)?;
    let status = RunStatus::from_str(&status_raw).ok_or_else(|| invalid_column(2, &status_raw))?;
    let document_ids_raw: String = row.get(3)?;
    let focus_claims_raw: String = row.get(4)?;
    let stop_after_raw: Option<String> = row.get(5)?;
    let stop_after_phase = match stop_after_raw {
        Some(raw) => Some(SamPhase::from_str(&raw).ok_or_else(|| invalid_column(5, &raw))?),
        None => None,
    };
    Ok(AnalysisRun {
        id: row.get(0)?,
        case_id: row.get(1)?,
        status,
        document_ids: parse_json_list(3, &document_ids_raw)?,
        focus_claims: parse_json_list(4, &focus_claims_raw)?,
        stop_after_phase,
        anchor_started_at: row.get(6)?,
        anchor_completed_at: row.get(7)?,
        inherit_started_at: row.get(8)?,
        inherit_completed_at: row.get(9)?,
        compound_started_at: row.get(10)?,
        compound_completed_at: row.get(11)?,
        arrive_started_at: row.get(12)?,
        arrive_completed_at: row.get(13)?,
        false_premises_found: row.get(14)?,
        propagation_chains_found: row.get(15)?,
        authority_accumulations_found: row.get(16)?,
        outcomes_linked: row.get(17)?,
        error_message: row.get(18)?,
        error_phase: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

fn map_claim(row: &Row<'_>) -> rusqlite::Result<Claim> {
    let category_raw: String = row.get(4)?;
    let foundation_raw: String = row.get(5)?;
    Ok(Claim {
        id: row.get(0)?,
        case_id: row.get(1)?,
        text: row.get(2)?,
        author: row.get(3)?,
        category: ClaimCategory::from_str(&category_raw)
            .ok_or_else(|| invalid_column(4, &category_raw))?,
        foundation: ClaimFoundation::from_str(&foundation_raw)
            .ok_or_else(|| invalid_column(5, &foundation_raw))?,
        source_document_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_origin(row: &Row<'_>) -> rusqlite::Result<ClaimOrigin> {
    let origin_type_raw: String = row.get(6)?;
    let false_premise_raw: Option<String> = row.get(8)?;
    let false_premise_type = match false_premise_raw {
        Some(raw) => {
            Some(FalsePremiseType::from_str(&raw).ok_or_else(|| invalid_column(8, &raw))?)
        }
        None => None,
    };
    Ok(ClaimOrigin {
        id: row.get(0)?,
        case_id: row.get(1)?,
        claim_id: row.get(2)?,
        origin_document_id: row.get(3)?,
        origin_date: row.get(4)?,
        origin_context: row.get(5)?,
        origin_type: OriginType::from_str(&origin_type_raw)
            .ok_or_else(|| invalid_column(6, &origin_type_raw))?,
        is_false_premise: row.get(7)?,
        false_premise_type,
        contradicting_evidence: row.get(9)?,
        confidence_score: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn map_propagation(row: &Row<'_>) -> rusqlite::Result<ClaimPropagation> {
    let mechanism_raw: String = row.get(7)?;
    let mutation_raw: Option<String> = row.get(13)?;
    let mutation_type = match mutation_raw {
        Some(raw) => Some(MutationType::from_str(&raw).ok_or_else(|| invalid_column(13, &raw))?),
        None => None,
    };
    Ok(ClaimPropagation {
        id: row.get(0)?,
        case_id: row.get(1)?,
        claim_id: row.get(2)?,
        source_document_id: row.get(3)?,
        source_date: row.get(4)?,
        target_document_id: row.get(5)?,
        target_date: row.get(6)?,
        mechanism: PropagationMechanism::from_str(&mechanism_raw)
            .ok_or_else(|| invalid_column(7, &mechanism_raw))?,
        verification_performed: row.get(8)?,
        verification_method: row.get(9)?,
        verification_outcome: row.get(10)?,
        crossed_institutional_boundary: row.get(11)?,
        mutation_detected: row.get(12)?,
        mutation_type,
        original_text: row.get(14)?,
        mutated_text: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn map_marker(row: &Row<'_>) -> rusqlite::Result<AuthorityMarker> {
    let authority_type_raw: String = row.get(6)?;
    let endorsement_raw: String = row.get(8)?;
    Ok(AuthorityMarker {
        id: row.get(0)?,
        case_id: row.get(1)?,
        claim_id: row.get(2)?,
        document_id: row.get(3)?,
        authority_date: row.get(4)?,
        institution: row.get(5)?,
        authority_type: AuthorityType::from_str(&authority_type_raw)
            .ok_or_else(|| invalid_column(6, &authority_type_raw))?,
        authority_weight: row.get(7)?,
        endorsement_type: EndorsementType::from_str(&endorsement_raw)
            .ok_or_else(|| invalid_column(8, &endorsement_raw))?,
        is_authority_laundering: row.get(9)?,
        laundering_reason: row.get(10)?,
        cumulative_score: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn map_outcome(row: &Row<'_>) -> rusqlite::Result<SamOutcome> {
    let outcome_type_raw: String = row.get(3)?;
    let harm_raw: String = row.get(6)?;
    let supporting_raw: String = row.get(8)?;
    let roots_raw: String = row.get(9)?;
    let verdict_raw: String = row.get(10)?;
    let remediation_raw: String = row.get(14)?;
    Ok(SamOutcome {
        id: row.get(0)?,
        case_id: row.get(1)?,
        document_id: row.get(2)?,
        outcome_type: OutcomeType::from_str(&outcome_type_raw)
            .ok_or_else(|| invalid_column(3, &outcome_type_raw))?,
        description: row.get(4)?,
        outcome_date: row.get(5)?,
        harm_level: HarmLevel::from_str(&harm_raw).ok_or_else(|| invalid_column(6, &harm_raw))?,
        harm_description: row.get(7)?,
        supporting_claims: parse_json_list(8, &supporting_raw)?,
        root_claim_ids: parse_json_list(9, &roots_raw)?,
        but_for_verdict: ButForVerdict::from_str(&verdict_raw)
            .ok_or_else(|| invalid_column(10, &verdict_raw))?,
        but_for_analysis: row.get(11)?,
        causation_confidence: row.get(12)?,
        remediation_possible: row.get(13)?,
        remediation_actions: parse_json_list(14, &remediation_raw)?,
        created_at: row.get(15)?,
    })
}

const DOCUMENT_COLUMNS: &str =
    "id, case_id, filename, doc_type, doc_date, source_entity, extracted_text, created_at, updated_at";

const RUN_COLUMNS: &str = "id, case_id, status, document_ids, focus_claims, stop_after_phase, \
     anchor_started_at, anchor_completed_at, inherit_started_at, inherit_completed_at, \
     compound_started_at, compound_completed_at, arrive_started_at, arrive_completed_at, \
     false_premises_found, propagation_chains_found, authority_accumulations_found, \
     outcomes_linked, error_message, error_phase, created_at, updated_at";

const CLAIM_COLUMNS: &str =
    "id, case_id, text, author, category, foundation, source_document_id, created_at";

const ORIGIN_COLUMNS: &str = "id, case_id, claim_id, origin_document_id, origin_date, \
     origin_context, origin_type, is_false_premise, false_premise_type, contradicting_evidence, \
     confidence_score, created_at";

const PROPAGATION_COLUMNS: &str = "id, case_id, claim_id, source_document_id, source_date, \
     target_document_id, target_date, mechanism, verification_performed, verification_method, \
     verification_outcome, crossed_institutional_boundary, mutation_detected, mutation_type, \
     original_text, mutated_text, created_at";

const MARKER_COLUMNS: &str = "id, case_id, claim_id, document_id, authority_date, institution, \
     authority_type, authority_weight, endorsement_type, is_authority_laundering, \
     laundering_reason, cumulative_score, created_at";

const OUTCOME_COLUMNS: &str = "id, case_id, document_id, outcome_type, description, outcome_date, \
     harm_level, harm_description, supporting_claims, root_claim_ids, but_for_verdict, \
     but_for_analysis, causation_confidence, remediation_possible, remediation_actions, created_at";

impl LineageStore for SqliteLineageStore {
    fn insert_document(&self, document: &CaseDocument) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO case_documents (id, case_id, filename, doc_type, doc_date, source_entity, extracted_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document.id,
                document.case_id,
                document.filename,
                document.doc_type.map(|t| t.as_str()),
                document.doc_date,
                document.source_entity,
                document.extracted_text,
                document.created_at,
                document.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_documents(&self, case_id: &str, ids: &[String]) -> AppResult<Vec<CaseDocument>> {
        let conn = self.db.get_connection()?;
        let rows = if ids.is_empty() {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM case_documents WHERE case_id = ? ORDER BY doc_date ASC, id ASC"
            ))?;
            let mapped = stmt.query_map([case_id], map_document)?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM case_documents WHERE case_id = ? AND id IN ({placeholders}) ORDER BY doc_date ASC, id ASC"
            ))?;
            let bind = std::iter::once(case_id).chain(ids.iter().map(|s| s.as_str()));
            let mapped = stmt.query_map(params_from_iter(bind), map_document)?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    fn insert_entity(&self, entity: &CaseEntity) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO case_entities (id, case_id, name, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity.id,
                entity.case_id,
                entity.name,
                entity.role,
                entity.created_at
            ],
        )?;
        Ok(())
    }

    fn get_entities(&self, case_id: &str) -> AppResult<Vec<CaseEntity>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, case_id, name, role, created_at FROM case_entities WHERE case_id = ? ORDER BY name ASC",
        )?;
        let mapped = stmt.query_map([case_id], map_entity)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_run(&self, run: &AnalysisRun) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO sam_analyses (id, case_id, status, document_ids, focus_claims, stop_after_phase, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.case_id,
                run.status.as_str(),
                json_list(&run.document_ids)?,
                json_list(&run.focus_claims)?,
                run.stop_after_phase.map(|p| p.as_str()),
                run.created_at,
                run.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> AppResult<AnalysisRun> {
        let conn = self.db.get_connection()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM sam_analyses WHERE id = ?"))?;
        let mut rows = stmt.query_map([run_id], map_run)?;
        match rows.next() {
            Some(run) => Ok(run?),
            None => Err(AppError::not_found(format!("analysis run {run_id}"))),
        }
    }

    fn set_run_status(&self, run_id: &str, status: RunStatus) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "UPDATE sam_analyses SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_phase_started(&self, run_id: &str, phase: SamPhase) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        // Column name comes from the fixed phase set, never from input.
        // Guarded so a late write from a cancelled execution cannot clobber
        // the terminal status, and a restarted phase clears any stale error.
        conn.execute(
            &format!(
                "UPDATE sam_analyses SET status = ?1, {}_started_at = ?2, error_phase = NULL, error_message = NULL, updated_at = ?2
                 WHERE id = ?3 AND status NOT IN ('completed', 'failed', 'cancelled')",
                phase.as_str()
            ),
            params![phase.status_running().as_str(), now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_phase_completed(&self, run_id: &str, phase: SamPhase) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            &format!(
                "UPDATE sam_analyses SET status = ?1, {}_completed_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status NOT IN ('completed', 'failed', 'cancelled')",
                phase.as_str()
            ),
            params![phase.status_complete().as_str(), now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_phase_counter(&self, run_id: &str, phase: SamPhase, count: u32) -> AppResult<()> {
        let column = match phase {
            SamPhase::Anchor => "false_premises_found",
            SamPhase::Inherit => "propagation_chains_found",
            SamPhase::Compound => "authority_accumulations_found",
            SamPhase::Arrive => "outcomes_linked",
        };
        let conn = self.db.get_connection()?;
        conn.execute(
            &format!("UPDATE sam_analyses SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
            params![count, now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_run_completed(&self, run_id: &str) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        // A concurrent cancellation wins over the terminal write
        conn.execute(
            "UPDATE sam_analyses SET status = 'completed', error_phase = NULL, error_message = NULL, updated_at = ?1
             WHERE id = ?2 AND status != 'cancelled'",
            params![now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_run_failed(&self, run_id: &str, phase: SamPhase, message: &str) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "UPDATE sam_analyses SET status = 'failed', error_phase = ?1, error_message = ?2, updated_at = ?3
             WHERE id = ?4 AND status != 'cancelled'",
            params![phase.as_str(), message, now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    fn set_run_cancelled(&self, run_id: &str) -> AppResult<bool> {
        let conn = self.db.get_connection()?;
        let changed = conn.execute(
            "UPDATE sam_analyses SET status = 'cancelled', updated_at = ?1
             WHERE id = ?2 AND status NOT IN ('completed', 'failed', 'cancelled')",
            params![now_rfc3339(), run_id],
        )?;
        Ok(changed > 0)
    }

    fn upsert_claim(&self, claim: &Claim, normalized_text: &str) -> AppResult<Claim> {
        let conn = self.db.get_connection()?;
        let existing = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLAIM_COLUMNS} FROM claims WHERE case_id = ? AND normalized_text = ?"
            ))?;
            let mut rows = stmt.query_map(params![claim.case_id, normalized_text], map_claim)?;
            rows.next().transpose()?
        };
        if let Some(found) = existing {
            return Ok(found);
        }
        conn.execute(
            "INSERT INTO claims (id, case_id, text, normalized_text, author, category, foundation, source_document_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                claim.id,
                claim.case_id,
                claim.text,
                normalized_text,
                claim.author,
                claim.category.as_str(),
                claim.foundation.as_str(),
                claim.source_document_id,
                claim.created_at,
            ],
        )?;
        Ok(claim.clone())
    }

    fn get_claims(&self, case_id: &str) -> AppResult<Vec<Claim>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE case_id = ? ORDER BY created_at ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([case_id], map_claim)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_origin(&self, origin: &ClaimOrigin) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO claim_origins (id, case_id, claim_id, origin_document_id, origin_date, origin_context, origin_type, is_false_premise, false_premise_type, contradicting_evidence, confidence_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(claim_id) DO UPDATE SET
                origin_document_id = excluded.origin_document_id,
                origin_date = excluded.origin_date,
                origin_context = excluded.origin_context,
                origin_type = excluded.origin_type,
                is_false_premise = excluded.is_false_premise,
                false_premise_type = excluded.false_premise_type,
                contradicting_evidence = excluded.contradicting_evidence,
                confidence_score = excluded.confidence_score",
            params![
                origin.id,
                origin.case_id,
                origin.claim_id,
                origin.origin_document_id,
                origin.origin_date,
                origin.origin_context,
                origin.origin_type.as_str(),
                origin.is_false_premise,
                origin.false_premise_type.map(|t| t.as_str()),
                origin.contradicting_evidence,
                origin.confidence_score,
                origin.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_origins(&self, case_id: &str) -> AppResult<Vec<ClaimOrigin>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORIGIN_COLUMNS} FROM claim_origins WHERE case_id = ? ORDER BY origin_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([case_id], map_origin)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_propagation(&self, propagation: &ClaimPropagation) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO claim_propagations (id, case_id, claim_id, source_document_id, source_date, target_document_id, target_date, mechanism, verification_performed, verification_method, verification_outcome, crossed_institutional_boundary, mutation_detected, mutation_type, original_text, mutated_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(claim_id, source_document_id, target_document_id) DO UPDATE SET
                source_date = excluded.source_date,
                target_date = excluded.target_date,
                mechanism = excluded.mechanism,
                verification_performed = excluded.verification_performed,
                verification_method = excluded.verification_method,
                verification_outcome = excluded.verification_outcome,
                crossed_institutional_boundary = excluded.crossed_institutional_boundary,
                mutation_detected = excluded.mutation_detected,
                mutation_type = excluded.mutation_type,
                original_text = excluded.original_text,
                mutated_text = excluded.mutated_text",
            params![
                propagation.id,
                propagation.case_id,
                propagation.claim_id,
                propagation.source_document_id,
                propagation.source_date,
                propagation.target_document_id,
                propagation.target_date,
                propagation.mechanism.as_str(),
                propagation.verification_performed,
                propagation.verification_method,
                propagation.verification_outcome,
                propagation.crossed_institutional_boundary,
                propagation.mutation_detected,
                propagation.mutation_type.map(|t| t.as_str()),
                propagation.original_text,
                propagation.mutated_text,
                propagation.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_propagations(&self, case_id: &str) -> AppResult<Vec<ClaimPropagation>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROPAGATION_COLUMNS} FROM claim_propagations WHERE case_id = ? ORDER BY source_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([case_id], map_propagation)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_propagations_for_claim(&self, claim_id: &str) -> AppResult<Vec<ClaimPropagation>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROPAGATION_COLUMNS} FROM claim_propagations WHERE claim_id = ? ORDER BY target_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([claim_id], map_propagation)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_marker(&self, marker: &AuthorityMarker) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO authority_markers (id, case_id, claim_id, document_id, authority_date, institution, authority_type, authority_weight, endorsement_type, is_authority_laundering, laundering_reason, cumulative_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(claim_id, document_id) DO UPDATE SET
                authority_date = excluded.authority_date,
                institution = excluded.institution,
                authority_type = excluded.authority_type,
                authority_weight = excluded.authority_weight,
                endorsement_type = excluded.endorsement_type,
                is_authority_laundering = excluded.is_authority_laundering,
                laundering_reason = excluded.laundering_reason,
                cumulative_score = excluded.cumulative_score",
            params![
                marker.id,
                marker.case_id,
                marker.claim_id,
                marker.document_id,
                marker.authority_date,
                marker.institution,
                marker.authority_type.as_str(),
                marker.authority_weight,
                marker.endorsement_type.as_str(),
                marker.is_authority_laundering,
                marker.laundering_reason,
                marker.cumulative_score,
                marker.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_markers(&self, case_id: &str) -> AppResult<Vec<AuthorityMarker>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS} FROM authority_markers WHERE case_id = ? ORDER BY authority_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([case_id], map_marker)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_markers_for_claim(&self, claim_id: &str) -> AppResult<Vec<AuthorityMarker>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MARKER_COLUMNS} FROM authority_markers WHERE claim_id = ? ORDER BY authority_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([claim_id], map_marker)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn set_final_cumulative_score(&self, claim_id: &str, score: i64) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "UPDATE authority_markers SET cumulative_score = ?1 WHERE claim_id = ?2",
            params![score, claim_id],
        )?;
        Ok(())
    }

    fn upsert_outcome(&self, outcome: &SamOutcome) -> AppResult<SamOutcome> {
        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO sam_outcomes (id, case_id, document_id, outcome_type, description, outcome_date, harm_level, harm_description, supporting_claims, root_claim_ids, but_for_verdict, but_for_analysis, causation_confidence, remediation_possible, remediation_actions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(document_id, description) DO UPDATE SET
                outcome_type = excluded.outcome_type,
                outcome_date = excluded.outcome_date,
                harm_level = excluded.harm_level,
                harm_description = excluded.harm_description,
                supporting_claims = excluded.supporting_claims,
                root_claim_ids = excluded.root_claim_ids,
                but_for_verdict = excluded.but_for_verdict,
                but_for_analysis = excluded.but_for_analysis,
                causation_confidence = excluded.causation_confidence,
                remediation_possible = excluded.remediation_possible,
                remediation_actions = excluded.remediation_actions",
            params![
                outcome.id,
                outcome.case_id,
                outcome.document_id,
                outcome.outcome_type.as_str(),
                outcome.description,
                outcome.outcome_date,
                outcome.harm_level.as_str(),
                outcome.harm_description,
                json_list(&outcome.supporting_claims)?,
                json_list(&outcome.root_claim_ids)?,
                outcome.but_for_verdict.as_str(),
                outcome.but_for_analysis,
                outcome.causation_confidence,
                outcome.remediation_possible,
                json_list(&outcome.remediation_actions)?,
                outcome.created_at,
            ],
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTCOME_COLUMNS} FROM sam_outcomes WHERE document_id = ? AND description = ?"
        ))?;
        let mut rows = stmt.query_map(
            params![outcome.document_id, outcome.description],
            map_outcome,
        )?;
        rows.next()
            .transpose()?
            .ok_or_else(|| AppError::database("outcome row missing after upsert"))
    }

    fn get_outcomes(&self, case_id: &str) -> AppResult<Vec<SamOutcome>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTCOME_COLUMNS} FROM sam_outcomes WHERE case_id = ? ORDER BY outcome_date ASC, id ASC"
        ))?;
        let mapped = stmt.query_map([case_id], map_outcome)?;
        Ok(mapped.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
