//! INHERIT Phase
//!
//! Walks each origin claim forward through the documents dated after its
//! origin, recording every hop where the claim reappears. The walk carries
//! the claim's current wording: when a hop mutates the text, later hops are
//! matched against the mutated form, so drift compounds the way it does in
//! a real paper trail.
//!
//! Chains for different claims are walked in parallel; hops within one
//! chain are strictly sequential because each hop depends on the text the
//! previous hop carried forward.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use claimtrace_analysis::InferenceRequest;

use crate::models::{
    CaseDocument, ClaimOrigin, ClaimPropagation, MutationType, PropagationMechanism,
};
use crate::utils::error::{AppError, AppResult};

use super::context::{AnchorOutput, InheritOutput, PhaseContext};

#[derive(Debug, Default, Deserialize)]
struct HopAnswer {
    #[serde(default)]
    present: bool,
    #[serde(default)]
    mechanism: Option<String>,
    #[serde(default)]
    verification_performed: bool,
    #[serde(default)]
    verification_method: Option<String>,
    #[serde(default)]
    verification_outcome: Option<String>,
    #[serde(default)]
    crossed_institutional_boundary: bool,
    #[serde(default)]
    mutation_detected: bool,
    #[serde(default)]
    mutation_type: Option<String>,
    #[serde(default)]
    mutated_text: Option<String>,
}

pub async fn run(ctx: Arc<PhaseContext>, anchor: &AnchorOutput) -> AppResult<InheritOutput> {
    // Canonical claim texts come from the store so fresh and resumed
    // executions walk identical chains.
    let claim_texts: HashMap<String, String> = ctx
        .store
        .get_claims(&ctx.case_id)?
        .into_iter()
        .map(|c| (c.id, c.text))
        .collect();

    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let mut handles = Vec::with_capacity(anchor.origins.len());
    for origin in anchor.origins.iter().cloned() {
        let Some(text) = claim_texts.get(&origin.claim_id).cloned() else {
            warn!(claim_id = %origin.claim_id, "origin has no stored claim text, skipping chain");
            continue;
        };
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;
            ctx.check_cancelled()?;
            walk_chain(&ctx, &origin, &text).await
        }));
    }

    let mut propagations = Vec::new();
    let mut chains_found = 0u32;
    for handle in handles {
        let hops = handle
            .await
            .map_err(|e| AppError::internal(format!("chain walk task panicked: {e}")))??;
        if !hops.is_empty() {
            chains_found += 1;
        }
        propagations.extend(hops);
    }

    debug!(
        run_id = %ctx.run_id,
        propagations = propagations.len(),
        chains = chains_found,
        "propagation mapping complete"
    );

    Ok(InheritOutput {
        propagations,
        chains_found,
    })
}

/// Documents a chain can hop into: strictly later than the origin date and
/// never the origin document itself. Input order (date ascending) is kept.
fn chain_targets<'a>(documents: &'a [CaseDocument], origin: &ClaimOrigin) -> Vec<&'a CaseDocument> {
    documents
        .iter()
        .filter(|d| {
            d.doc_date.as_str() > origin.origin_date.as_str() && d.id != origin.origin_document_id
        })
        .collect()
}

async fn walk_chain(
    ctx: &PhaseContext,
    origin: &ClaimOrigin,
    claim_text: &str,
) -> AppResult<Vec<ClaimPropagation>> {
    let mut hops = Vec::new();
    let mut current_text = claim_text.to_string();
    let mut source_document_id = origin.origin_document_id.clone();
    let mut source_date = origin.origin_date.clone();

    for target in chain_targets(&ctx.documents, origin) {
        ctx.check_cancelled()?;
        let Some(answer) = detect_hop(ctx, &current_text, &source_document_id, target).await
        else {
            continue;
        };
        if !answer.present {
            continue;
        }

        let propagation = build_propagation(
            &ctx.case_id,
            &origin.claim_id,
            &source_document_id,
            &source_date,
            target,
            &current_text,
            &answer,
        );
        ctx.store.upsert_propagation(&propagation)?;

        if let Some(text) = propagation.carried_text() {
            current_text = text.to_string();
        }
        source_document_id = target.id.clone();
        source_date = target.doc_date.clone();
        hops.push(propagation);
    }

    Ok(hops)
}

/// Ask whether the carried claim reappears in the target document.
/// Provider or decode failure degrades to "not present" for this hop.
async fn detect_hop(
    ctx: &PhaseContext,
    current_text: &str,
    source_document_id: &str,
    target: &CaseDocument,
) -> Option<HopAnswer> {
    let source_line = ctx
        .document(source_document_id)
        .map(describe_document)
        .unwrap_or_else(|| "unknown document".to_string());
    let request = InferenceRequest::new(
        hop_prompt(current_text, &source_line, &describe_document(target)),
        ctx.document_excerpt(target),
    );
    match ctx.provider.infer(request).await {
        Ok(value) => Some(decode_hop(&value)),
        Err(e) => {
            warn!(
                target_document_id = %target.id,
                error = %e,
                "hop detection failed, treating claim as absent from this document"
            );
            None
        }
    }
}

fn decode_hop(value: &Value) -> HopAnswer {
    match serde_json::from_value(value.clone()) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "hop answer did not decode, treating claim as absent");
            HopAnswer::default()
        }
    }
}

fn build_propagation(
    case_id: &str,
    claim_id: &str,
    source_document_id: &str,
    source_date: &str,
    target: &CaseDocument,
    carried_text: &str,
    answer: &HopAnswer,
) -> ClaimPropagation {
    let mutated_text = answer
        .mutated_text
        .clone()
        .filter(|t| !t.trim().is_empty());
    ClaimPropagation {
        id: uuid::Uuid::new_v4().to_string(),
        case_id: case_id.to_string(),
        claim_id: claim_id.to_string(),
        source_document_id: source_document_id.to_string(),
        source_date: source_date.to_string(),
        target_document_id: target.id.clone(),
        target_date: target.doc_date.clone(),
        mechanism: answer
            .mechanism
            .as_deref()
            .and_then(PropagationMechanism::from_str)
            .unwrap_or_default(),
        verification_performed: answer.verification_performed,
        verification_method: answer.verification_method.clone(),
        verification_outcome: answer.verification_outcome.clone(),
        crossed_institutional_boundary: answer.crossed_institutional_boundary,
        mutation_detected: answer.mutation_detected,
        mutation_type: answer
            .mutation_type
            .as_deref()
            .and_then(MutationType::from_str),
        original_text: Some(carried_text.to_string()),
        mutated_text,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn describe_document(document: &CaseDocument) -> String {
    format!(
        "{} ({}, {})",
        document.filename,
        document.doc_date,
        document.source_entity.as_deref().unwrap_or("unknown source"),
    )
}

fn hop_prompt(current_text: &str, source_line: &str, target_line: &str) -> String {
    format!(
        "TASK: Determine whether the claim below reappears in the target \
         document. The claim last appeared in the source document; judge from \
         the target document text whether it was carried forward, how, whether \
         anyone verified it, and whether its wording shifted.\n\n\
         CLAIM (as last carried): \"{}\"\n\
         SOURCE: {}\nTARGET: {}\n\n\
         OUTPUT FORMAT (JSON only):\n\
         {{\"present\": true|false, \
         \"mechanism\": \"verbatim|paraphrase|citation|implicit_adoption|circular_reference|authority_appeal\", \
         \"verification_performed\": true|false, \
         \"verification_method\": \"<method or null>\", \
         \"verification_outcome\": \"<outcome or null>\", \
         \"crossed_institutional_boundary\": true|false, \
         \"mutation_detected\": true|false, \
         \"mutation_type\": \"amplification|attenuation|certainty_drift|attribution_shift|scope_expansion|scope_contraction\" or null, \
         \"mutated_text\": \"<new wording or null>\"}}",
        current_text, source_line, target_line,
    )
}
