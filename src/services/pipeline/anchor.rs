//! ANCHOR Phase
//!
//! Extracts claims from every run document, clusters near-duplicates so one
//! assertion repeated across the record becomes a single canonical claim,
//! and classifies each cluster's earliest appearance as its origin.
//!
//! Extraction and classification calls run with bounded parallelism. A
//! failed provider call degrades that unit (no claims for the document, a
//! conservative default classification for the cluster) instead of failing
//! the phase; only cancellation aborts.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use claimtrace_analysis::InferenceRequest;

use crate::models::{
    CaseDocument, Claim, ClaimCategory, ClaimFoundation, ClaimOrigin, FalsePremiseType, OriginType,
};
use crate::services::clustering::cluster_claims;
use crate::utils::error::{AppError, AppResult};
use crate::utils::text::{jaccard_similarity, normalize_claim};

use super::context::{AnchorOutput, PhaseContext};

/// One extracted claim, pinned to the document it came from
#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    author: Option<String>,
    category: ClaimCategory,
    foundation: ClaimFoundation,
    document_id: String,
    document_date: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtractedClaim {
    #[serde(default)]
    text: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    foundation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    claims: Vec<ExtractedClaim>,
}

#[derive(Debug, Default, Deserialize)]
struct OriginAnswer {
    #[serde(default)]
    origin_type: Option<String>,
    #[serde(default)]
    is_false_premise: bool,
    #[serde(default)]
    false_premise_type: Option<String>,
    #[serde(default)]
    contradicting_evidence: Option<String>,
    #[serde(default)]
    origin_context: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Classification after decode and degrade handling
#[derive(Debug, Clone)]
struct Classification {
    origin_type: OriginType,
    is_false_premise: bool,
    false_premise_type: Option<FalsePremiseType>,
    contradicting_evidence: Option<String>,
    origin_context: Option<String>,
    confidence: f64,
}

impl Classification {
    /// Conservative fallback when the provider call or decode fails
    fn degraded() -> Self {
        Self {
            origin_type: OriginType::ProfessionalOpinion,
            is_false_premise: false,
            false_premise_type: None,
            contradicting_evidence: None,
            origin_context: None,
            confidence: 0.5,
        }
    }
}

pub async fn run(ctx: Arc<PhaseContext>) -> AppResult<AnchorOutput> {
    let candidates = extract_all(Arc::clone(&ctx)).await?;
    let claims_analyzed = candidates.len() as u32;
    debug!(
        run_id = %ctx.run_id,
        claims = claims_analyzed,
        documents = ctx.documents.len(),
        "claim extraction complete"
    );

    let keys: Vec<String> = candidates
        .iter()
        .map(|c| normalize_claim(&c.text, ctx.config.cluster_prefix_len))
        .collect();
    let clusters = cluster_claims(&keys, jaccard_similarity, ctx.config.similarity_threshold);

    // Focus filter keeps only clusters whose canonical text mentions one of
    // the requested fragments. Empty filter keeps everything.
    let focus: Vec<String> = ctx.focus_claims.iter().map(|f| f.to_lowercase()).collect();
    let survivors: Vec<_> = clusters
        .into_iter()
        .filter(|cluster| {
            if focus.is_empty() {
                return true;
            }
            let rep = candidates[cluster.representative()].text.to_lowercase();
            focus.iter().any(|f| rep.contains(f))
        })
        .collect();

    let classifications = classify_all(Arc::clone(&ctx), &candidates, &survivors).await?;

    let mut origins = Vec::with_capacity(survivors.len());
    let mut confidence_sum = 0.0;
    for (cluster, classification) in survivors.iter().zip(classifications) {
        ctx.check_cancelled()?;
        let rep = &candidates[cluster.representative()];

        let mut claim = Claim::new(&ctx.case_id, &rep.text, &rep.document_id);
        claim.author = rep.author.clone();
        claim.category = rep.category;
        claim.foundation = rep.foundation;
        let normalized = normalize_claim(&rep.text, ctx.config.cluster_prefix_len);
        let stored = ctx.store.upsert_claim(&claim, &normalized)?;

        let origin = ClaimOrigin {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: ctx.case_id.clone(),
            claim_id: stored.id,
            origin_document_id: rep.document_id.clone(),
            origin_date: rep.document_date.clone(),
            origin_context: classification.origin_context,
            origin_type: classification.origin_type,
            is_false_premise: classification.is_false_premise,
            false_premise_type: classification.false_premise_type,
            contradicting_evidence: classification.contradicting_evidence,
            confidence_score: classification.confidence,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        ctx.store.upsert_origin(&origin)?;
        confidence_sum += origin.confidence_score;
        origins.push(origin);
    }

    let aggregate_confidence = if origins.is_empty() {
        0.0
    } else {
        (confidence_sum / origins.len() as f64 * 100.0).round() / 100.0
    };

    Ok(AnchorOutput {
        origins,
        claims_analyzed,
        aggregate_confidence,
    })
}

/// Extract claims from every document with bounded parallelism. Results
/// are collected in document order, so the flattened candidate list stays
/// sorted by document date.
async fn extract_all(ctx: Arc<PhaseContext>) -> AppResult<Vec<Candidate>> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let mut handles = Vec::with_capacity(ctx.documents.len());
    for document in ctx.documents.iter().cloned() {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;
            ctx.check_cancelled()?;
            extract_document_claims(&ctx, &document).await
        }));
    }

    let mut candidates = Vec::new();
    for (document, handle) in ctx.documents.iter().zip(handles) {
        let extracted = handle
            .await
            .map_err(|e| AppError::internal(format!("extraction task panicked: {e}")))??;
        for claim in extracted {
            let text = claim.text.trim();
            if text.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                text: text.to_string(),
                author: claim.author.clone(),
                category: claim
                    .category
                    .as_deref()
                    .and_then(ClaimCategory::from_str)
                    .unwrap_or_default(),
                foundation: claim
                    .foundation
                    .as_deref()
                    .and_then(ClaimFoundation::from_str)
                    .unwrap_or_default(),
                document_id: document.id.clone(),
                document_date: document.doc_date.clone(),
            });
        }
    }
    Ok(candidates)
}

async fn extract_document_claims(
    ctx: &PhaseContext,
    document: &CaseDocument,
) -> AppResult<Vec<ExtractedClaim>> {
    let request = InferenceRequest::new(
        extraction_prompt(document, &ctx.entity_summary()),
        ctx.document_excerpt(document),
    );
    match ctx.provider.infer(request).await {
        Ok(value) => match decode_extraction(&value) {
            Some(claims) => Ok(claims),
            None => {
                warn!(
                    document_id = %document.id,
                    "extraction response did not decode, treating document as empty"
                );
                Ok(Vec::new())
            }
        },
        Err(e) => {
            warn!(
                document_id = %document.id,
                error = %e,
                "claim extraction failed, continuing without this document"
            );
            Ok(Vec::new())
        }
    }
}

/// Classify each surviving cluster's representative, in cluster order
async fn classify_all(
    ctx: Arc<PhaseContext>,
    candidates: &[Candidate],
    clusters: &[crate::services::clustering::ClaimCluster],
) -> AppResult<Vec<Classification>> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrency));
    let mut handles = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let rep = candidates[cluster.representative()].clone();
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| AppError::Cancelled)?;
            ctx.check_cancelled()?;
            Ok::<_, AppError>(classify_origin(&ctx, &rep).await)
        }));
    }

    let mut classifications = Vec::with_capacity(handles.len());
    for handle in handles {
        classifications.push(
            handle
                .await
                .map_err(|e| AppError::internal(format!("classification task panicked: {e}")))??,
        );
    }
    Ok(classifications)
}

async fn classify_origin(ctx: &PhaseContext, candidate: &Candidate) -> Classification {
    let excerpt = ctx
        .document(&candidate.document_id)
        .map(|d| ctx.document_excerpt(d))
        .unwrap_or_default();
    let request = InferenceRequest::new(
        classification_prompt(
            &candidate.text,
            candidate.author.as_deref(),
            &candidate.document_date,
            &ctx.entity_summary(),
        ),
        excerpt,
    );
    match ctx.provider.infer(request).await {
        Ok(value) => decode_classification(&value),
        Err(e) => {
            warn!(
                document_id = %candidate.document_id,
                error = %e,
                "origin classification failed, using conservative defaults"
            );
            Classification::degraded()
        }
    }
}

fn decode_extraction(value: &Value) -> Option<Vec<ExtractedClaim>> {
    if value.is_array() {
        serde_json::from_value(value.clone()).ok()
    } else {
        serde_json::from_value::<ExtractionResponse>(value.clone())
            .ok()
            .map(|r| r.claims)
    }
}

fn decode_classification(value: &Value) -> Classification {
    let answer: OriginAnswer = match serde_json::from_value(value.clone()) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "origin answer did not decode, using conservative defaults");
            return Classification::degraded();
        }
    };
    Classification {
        origin_type: answer
            .origin_type
            .as_deref()
            .and_then(OriginType::from_str)
            .unwrap_or_default(),
        is_false_premise: answer.is_false_premise,
        false_premise_type: answer
            .false_premise_type
            .as_deref()
            .and_then(FalsePremiseType::from_str),
        contradicting_evidence: answer.contradicting_evidence,
        origin_context: answer.origin_context,
        confidence: answer.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    }
}

fn extraction_prompt(document: &CaseDocument, entity_summary: &str) -> String {
    format!(
        "TASK: Extract every substantive claim from the document below. A claim \
         is a statement asserting that something happened, is true, or should \
         happen. Skip headings, boilerplate, and procedural formalities.\n\n\
         DOCUMENT: {} (type: {}, date: {}, source: {})\n\n\
         {}OUTPUT FORMAT (JSON only):\n\
         {{\"claims\": [{{\"text\": \"<claim text>\", \"author\": \"<asserting person or null>\", \
         \"category\": \"factual|opinion|finding|recommendation|conclusion|allegation\", \
         \"foundation\": \"verified|supported|unsupported|contested|circular|contaminated|unfounded\"}}]}}",
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

fn classification_prompt(
    claim_text: &str,
    author: Option<&str>,
    origin_date: &str,
    entity_summary: &str,
) -> String {
    format!(
        "TASK: Classify the origin of the claim below. The document provided is \
         its EARLIEST appearance in the case record (dated {}). Judge how the \
         claim entered the record and whether it rests on a false premise, \
         using only the document text.\n\n\
         CLAIM: \"{}\"\nCLAIMED AUTHOR: {}\n\n\
         {}OUTPUT FORMAT (JSON only):\n\
         {{\"origin_type\": \"primary_source|professional_opinion|hearsay|speculation|misattribution|fabrication\", \
         \"is_false_premise\": true|false, \
         \"false_premise_type\": \"factual_error|misattribution|speculation_as_fact|context_stripping|selective_quotation|temporal_distortion\" or null, \
         \"contradicting_evidence\": \"<evidence or null>\", \
         \"origin_context\": \"<verbatim excerpt where the claim first appears>\", \
         \"confidence\": 0.0-1.0}}",
        origin_date,
        claim_text,
        author.unwrap_or("unknown"),
        entity_summary,
    )
}
