//! COMPOUND Phase
//!
//! Scores the institutional authority each document lends to a claim as it
//! travels through the record. Every chain starts at the origin document and
//! follows the claim's propagation hops in date order, building one
//! authority marker per endorsing document and a running cumulative total.
//!
//! Provider weight estimates are reconciled against a fixed institution
//! table so the same court never scores differently across runs. Four
//! laundering heuristics watch the accumulation: a tainted or false-premise
//! origin that gathers too much weight, a circular hop, or a chain with
//! three or more unverified propagations marks the marker as laundering.
//!
//! Chains for different claims are scored in parallel; markers within one
//! chain are strictly sequential because each carries the cumulative total
//! at its point in the chain.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use claimtrace_analysis::InferenceRequest;

use crate::models::{
    AuthorityMarker, AuthorityType, CaseDocument, ClaimOrigin, ClaimPropagation, EndorsementType,
    PropagationMechanism,
};
use crate::services::authority::reconcile_weight;
use crate::utils::error::{AppError, AppResult};

use super::context::{AnchorOutput, CompoundOutput, InheritOutput, PhaseContext};

#[derive(Debug, Default, Deserialize)]
struct AuthorityAnswer {
    #[serde(default)]
    institution: Option<String>,
    #[serde(default)]
    authority_type: Option<String>,
    #[serde(default)]
    weight: Option<i64>,
    #[serde(default)]
    endorsement_type: Option<String>,
}

/// One document's scored endorsement after decode and weight reconciliation
#[derive(Debug, Clone)]
struct Scored {
    institution: String,
    authority_type: AuthorityType,
    weight: i64,
    endorsement_type: EndorsementType,
    degraded: bool,
}

impl Scored {
    /// Minimal marker values when the provider call or decode fails
    fn degraded() -> Self {
        Self {
            institution: "unknown".to_string(),
            authority_type: AuthorityType::default(),
            weight: 2,
            endorsement_type: EndorsementType::ReferencedWithoutVerification,
            degraded: true,
        }
    }
}

pub async fn run(
    ctx: Arc<PhaseContext>,
    anchor: &AnchorOutput,
    inherit: &InheritOutput,
) -> AppResult<CompoundOutput> {
    let claim_texts: HashMap<String, String> = ctx
        .store
        .get_claims(&ctx.case_id)?
        .into_iter()
        .map(|c| (c.id, c.text))
        .collect();

    // Hops grouped per claim and sorted by target date so resumed and fresh
    // executions walk each chain in the same order.
    let mut chains: HashMap<String, Vec<ClaimPropagation>> = HashMap::new();
    for propagation in &inherit.propagations {
        chains
            .entry(propagation.claim_id.clone())
            .or_default()
            .push(propagation.clone());
    }
    for hops in chains.values_mut() {
        hops.sort_by(|a, b| a.target_date.cmp(&b.target_date));
    }

    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let mut handles = Vec::with_capacity(anchor.origins.len());
    for origin in anchor.origins.iter().cloned() {
        let Some(text) = claim_texts.get(&origin.claim_id).cloned() else {
            warn!(claim_id = %origin.claim_id, "origin has no stored claim text, skipping chain");
            continue;
        };
        let hops = chains.remove(&origin.claim_id).unwrap_or_default();
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;
            ctx.check_cancelled()?;
            score_chain(&ctx, &origin, &text, &hops).await
        }));
    }

    let mut markers = Vec::new();
    let mut final_scores = HashMap::new();
    for handle in handles {
        let chain = handle
            .await
            .map_err(|e| AppError::internal(format!("authority scoring task panicked: {e}")))??;
        if let Some(first) = chain.first() {
            final_scores.insert(first.claim_id.clone(), first.cumulative_score);
        }
        markers.extend(chain);
    }

    debug!(
        run_id = %ctx.run_id,
        markers = markers.len(),
        laundering = markers.iter().filter(|m| m.is_authority_laundering).count(),
        "authority accumulation complete"
    );

    Ok(CompoundOutput {
        markers,
        final_scores,
    })
}

/// Score one claim's chain: the origin document first, then every hop target
/// in date order. Markers are persisted with the running total as they are
/// built; once the chain is done the final total is written onto all of them.
async fn score_chain(
    ctx: &PhaseContext,
    origin: &ClaimOrigin,
    claim_text: &str,
    hops: &[ClaimPropagation],
) -> AppResult<Vec<AuthorityMarker>> {
    let unverified_hops = hops.iter().filter(|h| !h.verification_performed).count();
    let mut cumulative = 0i64;
    let mut markers = Vec::with_capacity(hops.len() + 1);

    ctx.check_cancelled()?;
    let scored = score_document(ctx, claim_text, &origin.origin_document_id).await;
    cumulative += scored.weight;
    let marker = build_marker(
        &ctx.case_id,
        origin,
        &origin.origin_document_id,
        &origin.origin_date,
        &scored,
        None,
        cumulative,
        unverified_hops,
    );
    ctx.store.upsert_marker(&marker)?;
    markers.push(marker);

    for hop in hops {
        ctx.check_cancelled()?;
        let scored = score_document(ctx, claim_text, &hop.target_document_id).await;
        cumulative += scored.weight;
        let marker = build_marker(
            &ctx.case_id,
            origin,
            &hop.target_document_id,
            &hop.target_date,
            &scored,
            Some(hop),
            cumulative,
            unverified_hops,
        );
        ctx.store.upsert_marker(&marker)?;
        markers.push(marker);
    }

    ctx.store
        .set_final_cumulative_score(&origin.claim_id, cumulative)?;
    for marker in &mut markers {
        marker.cumulative_score = cumulative;
    }

    Ok(markers)
}

/// Score one document's endorsement of the claim. Provider or decode
/// failure degrades to the minimal marker values.
async fn score_document(ctx: &PhaseContext, claim_text: &str, document_id: &str) -> Scored {
    let Some(document) = ctx.document(document_id) else {
        warn!(
            document_id = %document_id,
            "endorsing document not in run set, using minimal marker"
        );
        return Scored::degraded();
    };
    let request = InferenceRequest::new(
        authority_prompt(claim_text, document, &ctx.entity_summary()),
        ctx.document_excerpt(document),
    );
    match ctx.provider.infer(request).await {
        Ok(value) => decode_authority(&value),
        Err(e) => {
            warn!(
                document_id = %document_id,
                error = %e,
                "authority scoring failed, using minimal marker"
            );
            Scored::degraded()
        }
    }
}

fn decode_authority(value: &Value) -> Scored {
    let answer: AuthorityAnswer = match serde_json::from_value(value.clone()) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "authority answer did not decode, using minimal marker");
            return Scored::degraded();
        }
    };
    let institution = answer
        .institution
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let weight = reconcile_weight(answer.weight.unwrap_or(2), &institution);
    Scored {
        institution,
        authority_type: answer
            .authority_type
            .as_deref()
            .and_then(AuthorityType::from_str)
            .unwrap_or_default(),
        weight,
        endorsement_type: answer
            .endorsement_type
            .as_deref()
            .and_then(EndorsementType::from_str)
            .unwrap_or_default(),
        degraded: false,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_marker(
    case_id: &str,
    origin: &ClaimOrigin,
    document_id: &str,
    date: &str,
    scored: &Scored,
    hop: Option<&ClaimPropagation>,
    cumulative: i64,
    unverified_hops: usize,
) -> AuthorityMarker {
    // A degraded score never carries a laundering verdict
    let laundering_reason = if scored.degraded {
        None
    } else {
        check_laundering(origin, hop, cumulative, unverified_hops)
    };
    AuthorityMarker {
        id: uuid::Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        claim_id: origin.claim_id.clone(),
        document_id: document_id.to_string(),
        authority_date: date.to_string(),
        institution: scored.institution.clone(),
        authority_type: scored.authority_type,
        authority_weight: scored.weight,
        endorsement_type: scored.endorsement_type,
        is_authority_laundering: laundering_reason.is_some(),
        laundering_reason,
        cumulative_score: cumulative,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Apply the four laundering heuristics to one marker. The first that fires
/// names the reason. The unverified-hop count is a property of the whole
/// chain; the cumulative total is the running value at this marker.
fn check_laundering(
    origin: &ClaimOrigin,
    hop: Option<&ClaimPropagation>,
    cumulative: i64,
    unverified_hops: usize,
) -> Option<String> {
    if origin.origin_type.is_tainted() && cumulative > 15 {
        return Some(format!(
            "{} origin has accumulated authority {} with no independent basis",
            origin.origin_type.as_str(),
            cumulative,
        ));
    }
    if let Some(hop) = hop {
        if hop.mechanism == PropagationMechanism::CircularReference {
            return Some(
                "claim re-enters the record via a document that itself relies on this claim"
                    .to_string(),
            );
        }
    }
    if unverified_hops >= 3 {
        return Some(format!(
            "{unverified_hops} propagations in this chain carry the claim without independent verification",
        ));
    }
    if origin.is_false_premise && cumulative > 10 {
        return Some(format!(
            "false premise has accumulated authority {cumulative} across the chain",
        ));
    }
    None
}

fn authority_prompt(claim_text: &str, document: &CaseDocument, entity_summary: &str) -> String {
    format!(
        "TASK: Assess the institutional authority the document below lends to \
         the claim. Identify the institution or role that produced the \
         document, the kind of authority the document represents, how heavily \
         that institution's word weighs, and whether the document adopts the \
         claim or merely repeats it.\n\n\
         CLAIM: \"{}\"\n\
         DOCUMENT: {} (type: {}, date: {}, source: {})\n\n\
         {}OUTPUT FORMAT (JSON only):\n\
         {{\"institution\": \"<institution or role string>\", \
         \"authority_type\": \"court_finding|expert_opinion|official_report|professional_assessment|police_conclusion|agency_determination\", \
         \"weight\": 1-10, \
         \"endorsement_type\": \"explicit_adoption|implicit_reliance|qualified_acceptance|referenced_without_verification\"}}",
        claim_text,
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
