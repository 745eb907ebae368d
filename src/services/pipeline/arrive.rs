//! ARRIVE Phase
//!
//! Finds the consequential decisions the case record produced and ties each
//! one back to the false premises that fed it. Outcomes are enumerated from
//! decision-bearing documents, matched against false premises by text
//! overlap, and assessed for but-for causation with the accumulated
//! authority behind each premise in evidence.
//!
//! Outcomes no false premise supports are dropped: the phase only reports
//! decisions it can causally anchor. A failed causation call keeps the
//! outcome with an uncertain verdict rather than losing it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use claimtrace_analysis::InferenceRequest;

use crate::models::{
    ButForVerdict, CaseDocument, CausationChain, ClaimOrigin, ClaimPropagation, HarmLevel,
    OutcomeType, SamOutcome,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::text::prefix_overlap;

use super::context::{AnchorOutput, ArriveOutput, CompoundOutput, InheritOutput, PhaseContext};

/// One enumerated outcome pinned to its document, before premise matching
#[derive(Debug, Clone)]
struct Candidate {
    document_id: String,
    outcome_type: OutcomeType,
    description: String,
    outcome_date: Option<String>,
    supporting_claims: Vec<String>,
    harm_level: HarmLevel,
    harm_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EnumeratedOutcome {
    #[serde(default)]
    outcome_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    supporting_claims: Vec<String>,
    #[serde(default)]
    harm_level: Option<String>,
    #[serde(default)]
    harm_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutcomeResponse {
    #[serde(default)]
    outcomes: Vec<EnumeratedOutcome>,
}

#[derive(Debug, Default, Deserialize)]
struct CausationAnswer {
    #[serde(default)]
    but_for_verdict: Option<String>,
    #[serde(default)]
    but_for_analysis: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    harm_description: Option<String>,
    #[serde(default)]
    remediation_possible: Option<bool>,
    #[serde(default)]
    remediation_actions: Vec<String>,
}

/// Causation assessment after decode and degrade handling
#[derive(Debug, Clone)]
struct Causation {
    verdict: ButForVerdict,
    analysis: Option<String>,
    confidence: f64,
    harm_description: Option<String>,
    remediation_possible: bool,
    remediation_actions: Vec<String>,
}

impl Causation {
    /// Conservative fallback keeping the outcome without a causal verdict
    fn degraded() -> Self {
        Self {
            verdict: ButForVerdict::Uncertain,
            analysis: None,
            confidence: 0.3,
            harm_description: None,
            remediation_possible: true,
            remediation_actions: vec![
                "Re-assess this outcome once the underlying claims have been independently verified"
                    .to_string(),
            ],
        }
    }
}

pub async fn run(
    ctx: Arc<PhaseContext>,
    anchor: &AnchorOutput,
    inherit: &InheritOutput,
    compound: &CompoundOutput,
) -> AppResult<ArriveOutput> {
    let candidates = enumerate_all(Arc::clone(&ctx)).await?;
    debug!(
        run_id = %ctx.run_id,
        candidates = candidates.len(),
        "outcome enumeration complete"
    );

    // False premise match texts: the origin excerpt when the classification
    // captured one, otherwise the canonical claim text.
    let claim_texts: HashMap<String, String> = ctx
        .store
        .get_claims(&ctx.case_id)?
        .into_iter()
        .map(|c| (c.id, c.text))
        .collect();
    let premises: Vec<(String, String)> = anchor
        .origins
        .iter()
        .filter(|o| o.is_false_premise)
        .map(|o| {
            let text = o
                .origin_context
                .clone()
                .filter(|t| !t.trim().is_empty())
                .or_else(|| claim_texts.get(&o.claim_id).cloned())
                .unwrap_or_default();
            (o.claim_id.clone(), text)
        })
        .collect();

    let mut dropped = 0usize;
    let mut survivors = Vec::new();
    for candidate in candidates {
        let root_claim_ids = match_premises(
            &premises,
            &candidate.supporting_claims,
            ctx.config.overlap_prefix_len,
        );
        if root_claim_ids.is_empty() {
            dropped += 1;
            continue;
        }
        survivors.push((candidate, root_claim_ids));
    }
    if dropped > 0 {
        debug!(
            run_id = %ctx.run_id,
            dropped,
            "outcomes without a matching false premise dropped"
        );
    }

    let origins_by_claim: HashMap<String, ClaimOrigin> = anchor
        .origins
        .iter()
        .map(|o| (o.claim_id.clone(), o.clone()))
        .collect();

    let mut outcomes = Vec::with_capacity(survivors.len());
    for (candidate, root_claim_ids) in survivors {
        ctx.check_cancelled()?;
        let premise_block = premise_lines(
            &root_claim_ids,
            &origins_by_claim,
            &claim_texts,
            &compound.final_scores,
        );
        let causation = assess_causation(&ctx, &candidate, &premise_block).await;

        let outcome = SamOutcome {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: ctx.case_id.clone(),
            document_id: candidate.document_id.clone(),
            outcome_type: candidate.outcome_type,
            description: candidate.description.clone(),
            outcome_date: candidate.outcome_date.clone(),
            harm_level: candidate.harm_level,
            harm_description: causation
                .harm_description
                .or(candidate.harm_description.clone()),
            supporting_claims: candidate.supporting_claims.clone(),
            root_claim_ids,
            but_for_verdict: causation.verdict,
            but_for_analysis: causation.analysis,
            causation_confidence: causation.confidence,
            remediation_possible: causation.remediation_possible,
            remediation_actions: causation.remediation_actions,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        // The canonical row keeps its id across re-runs, so chains derived
        // here and from the store agree.
        outcomes.push(ctx.store.upsert_outcome(&outcome)?);
    }

    let document_names: HashMap<String, String> = ctx
        .documents
        .iter()
        .map(|d| (d.id.clone(), d.filename.clone()))
        .collect();
    let causation_chains = outcomes
        .iter()
        .map(|o| {
            build_causation_chain(
                o,
                &inherit.propagations,
                &compound.final_scores,
                &document_names,
            )
        })
        .collect();

    Ok(ArriveOutput {
        outcomes,
        causation_chains,
    })
}

/// Enumerate candidate outcomes from every decision-bearing document with
/// bounded parallelism. Provider failure degrades to no outcomes for that
/// document.
async fn enumerate_all(ctx: Arc<PhaseContext>) -> AppResult<Vec<Candidate>> {
    let bearing: Vec<CaseDocument> = ctx
        .documents
        .iter()
        .filter(|d| d.may_bear_outcomes())
        .cloned()
        .collect();

    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let mut handles = Vec::with_capacity(bearing.len());
    for document in bearing.iter().cloned() {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;
            ctx.check_cancelled()?;
            enumerate_document_outcomes(&ctx, &document).await
        }));
    }

    let mut candidates = Vec::new();
    for (document, handle) in bearing.iter().zip(handles) {
        let enumerated = handle
            .await
            .map_err(|e| AppError::internal(format!("outcome enumeration task panicked: {e}")))??;
        for outcome in enumerated {
            let description = outcome.description.trim();
            if description.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                document_id: document.id.clone(),
                outcome_type: outcome
                    .outcome_type
                    .as_deref()
                    .and_then(OutcomeType::from_str)
                    .unwrap_or_default(),
                description: description.to_string(),
                outcome_date: outcome.date.clone().filter(|d| !d.trim().is_empty()),
                supporting_claims: outcome.supporting_claims.clone(),
                harm_level: outcome
                    .harm_level
                    .as_deref()
                    .and_then(HarmLevel::from_str)
                    .unwrap_or_default(),
                harm_description: outcome.harm_description.clone(),
            });
        }
    }
    Ok(candidates)
}

async fn enumerate_document_outcomes(
    ctx: &PhaseContext,
    document: &CaseDocument,
) -> AppResult<Vec<EnumeratedOutcome>> {
    let request = InferenceRequest::new(
        enumeration_prompt(document, &ctx.entity_summary()),
        ctx.document_excerpt(document),
    );
    match ctx.provider.infer(request).await {
        Ok(value) => match decode_outcomes(&value) {
            Some(outcomes) => Ok(outcomes),
            None => {
                warn!(
                    document_id = %document.id,
                    "outcome response did not decode, treating document as decision-free"
                );
                Ok(Vec::new())
            }
        },
        Err(e) => {
            warn!(
                document_id = %document.id,
                error = %e,
                "outcome enumeration failed, continuing without this document"
            );
            Ok(Vec::new())
        }
    }
}

/// Claim ids of false premises whose match text overlaps any of the
/// outcome's supporting-claim texts, in premise order
fn match_premises(
    premises: &[(String, String)],
    supporting_claims: &[String],
    prefix_len: usize,
) -> Vec<String> {
    premises
        .iter()
        .filter(|(_, text)| {
            supporting_claims
                .iter()
                .any(|s| prefix_overlap(text, s, prefix_len))
        })
        .map(|(claim_id, _)| claim_id.clone())
        .collect()
}

fn premise_lines(
    root_claim_ids: &[String],
    origins_by_claim: &HashMap<String, ClaimOrigin>,
    claim_texts: &HashMap<String, String>,
    final_scores: &HashMap<String, i64>,
) -> String {
    let mut lines = String::new();
    for claim_id in root_claim_ids {
        let text = claim_texts
            .get(claim_id)
            .map(String::as_str)
            .unwrap_or("unknown claim");
        let origin_type = origins_by_claim
            .get(claim_id)
            .map(|o| o.origin_type.as_str())
            .unwrap_or("unknown");
        let authority = final_scores.get(claim_id).copied().unwrap_or(0);
        lines.push_str(&format!(
            "- \"{text}\" (origin: {origin_type}, accumulated authority: {authority})\n"
        ));
    }
    lines
}

/// Ask whether the outcome would have occurred absent the false premises.
/// Provider or decode failure degrades to an uncertain verdict.
async fn assess_causation(
    ctx: &PhaseContext,
    candidate: &Candidate,
    premise_block: &str,
) -> Causation {
    let excerpt = ctx
        .document(&candidate.document_id)
        .map(|d| ctx.document_excerpt(d))
        .unwrap_or_default();
    let request = InferenceRequest::new(causation_prompt(candidate, premise_block), excerpt);
    match ctx.provider.infer(request).await {
        Ok(value) => decode_causation(&value),
        Err(e) => {
            warn!(
                document_id = %candidate.document_id,
                error = %e,
                "causation assessment failed, keeping outcome with uncertain verdict"
            );
            Causation::degraded()
        }
    }
}

fn decode_outcomes(value: &Value) -> Option<Vec<EnumeratedOutcome>> {
    if value.is_array() {
        serde_json::from_value(value.clone()).ok()
    } else {
        serde_json::from_value::<OutcomeResponse>(value.clone())
            .ok()
            .map(|r| r.outcomes)
    }
}

fn decode_causation(value: &Value) -> Causation {
    let answer: CausationAnswer = match serde_json::from_value(value.clone()) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "causation answer did not decode, using uncertain verdict");
            return Causation::degraded();
        }
    };
    Causation {
        verdict: answer
            .but_for_verdict
            .as_deref()
            .and_then(ButForVerdict::from_str)
            .unwrap_or_default(),
        analysis: answer.but_for_analysis.filter(|t| !t.trim().is_empty()),
        confidence: answer.confidence.unwrap_or(0.3).clamp(0.0, 1.0),
        harm_description: answer.harm_description.filter(|t| !t.trim().is_empty()),
        remediation_possible: answer.remediation_possible.unwrap_or(false),
        remediation_actions: answer.remediation_actions,
    }
}

/// Derive the causation chain for one outcome: each root claim's hops in
/// date order, cut after the hop that reaches the outcome's document, and
/// the summed final authority of the root claims. Never persisted.
pub(crate) fn build_causation_chain(
    outcome: &SamOutcome,
    propagations: &[ClaimPropagation],
    final_scores: &HashMap<String, i64>,
    document_names: &HashMap<String, String>,
) -> CausationChain {
    let name = |id: &str| {
        document_names
            .get(id)
            .map(String::as_str)
            .unwrap_or(id)
            .to_string()
    };

    let mut propagation_path = Vec::new();
    let mut authority_accumulation = 0i64;
    for claim_id in &outcome.root_claim_ids {
        authority_accumulation += final_scores.get(claim_id).copied().unwrap_or(0);
        let mut hops: Vec<&ClaimPropagation> = propagations
            .iter()
            .filter(|p| &p.claim_id == claim_id)
            .collect();
        hops.sort_by(|a, b| a.target_date.cmp(&b.target_date));
        for hop in hops {
            propagation_path.push(format!(
                "{} -> {} ({})",
                name(&hop.source_document_id),
                name(&hop.target_document_id),
                hop.mechanism.as_str(),
            ));
            if hop.target_document_id == outcome.document_id {
                break;
            }
        }
    }

    CausationChain {
        outcome_id: outcome.id.clone(),
        root_claim_ids: outcome.root_claim_ids.clone(),
        propagation_path,
        authority_accumulation,
    }
}

fn enumeration_prompt(document: &CaseDocument, entity_summary: &str) -> String {
    format!(
        "TASK: Identify every consequential decision or outcome recorded in \
         the document below: orders made, findings reached, recommendations \
         adopted, agency decisions taken. For each one, quote the claim \
         text(s) the document relies on to support it and judge the harm it \
         caused.\n\n\
         DOCUMENT: {} (type: {}, date: {}, source: {})\n\n\
         {}OUTPUT FORMAT (JSON only):\n\
         {{\"outcomes\": [{{\"outcome_type\": \"court_order|finding_of_fact|recommendation|agency_decision|regulatory_action|media_publication\", \
         \"description\": \"<what was decided>\", \
         \"date\": \"<date or null>\", \
         \"supporting_claims\": [\"<claim text relied on>\"], \
         \"harm_level\": \"catastrophic|severe|moderate|minor\", \
         \"harm_description\": \"<harm or null>\"}}]}}",
        document.filename,
        document
            .doc_type
            .map(|t| t.as_str())
            .unwrap_or("unknown"),
        document.doc_date,
        document.source_entity.as_deref().unwrap_or("unknown"),
        entity_summary,
    )
}

fn causation_prompt(candidate: &Candidate, premise_block: &str) -> String {
    format!(
        "TASK: Assess but-for causation for the outcome below. Would it have \
         occurred had the listed false premises never entered the case \
         record? Weigh how much institutional authority each premise had \
         accumulated by the time of the decision, and suggest remediation if \
         the outcome rests on them.\n\n\
         OUTCOME: {} (type: {}, harm: {})\n\n\
         FALSE PREMISES RELIED ON:\n{}\n\
         OUTPUT FORMAT (JSON only):\n\
         {{\"but_for_verdict\": \"definitely_not|probably_not|uncertain|probably_yes|definitely_yes\", \
         \"but_for_analysis\": \"<narrative>\", \
         \"confidence\": 0.0-1.0, \
         \"harm_description\": \"<refined harm or null>\", \
         \"remediation_possible\": true|false, \
         \"remediation_actions\": [\"<action>\"]}}",
        candidate.description,
        candidate.outcome_type.as_str(),
        candidate.harm_level.as_str(),
        premise_block,
    )
}
