//! Degraded-Analysis Integration Tests
//!
//! Provider faults inside a phase step degrade that step and never abort
//! the run. Each test fails or garbles one analysis task over the standard
//! corpus and checks the run still completes with the documented fallback:
//! - Extraction faults yield no candidates for the affected document
//! - Classification faults fall back to a non-premise professional opinion
//! - Hop faults leave the claim absent; the chain continues from the last
//!   confirmed document
//! - Authority faults score a minimal unknown-institution marker that is
//!   never flagged as laundering
//! - Causation faults keep the outcome with an uncertain verdict

use std::sync::Arc;

use serde_json::json;

use claimtrace::models::{
    AuthorityType, ButForVerdict, EndorsementType, OriginType, PropagationMechanism, RunStatus,
};
use claimtrace::{LineageStore, PipelineEvent};

use crate::support::{
    build_service, claim_by_text, drain_until_terminal, in_memory_store, marker_for, seed_corpus,
    ScriptedProvider, CASE_ID, DOC_HV, DOC_ORDER, DOC_SW, ENGAGED_CLAIM, INTOX_CLAIM,
    INTOX_MUTATED, RESTRICTION_OUTCOME,
};

// ============================================================================
// Extraction
// ============================================================================

#[tokio::test]
async fn test_extraction_faults_drop_documents_but_complete_run() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    // The note's extraction call dies outright; the report's returns JSON
    // in the wrong shape
    let provider = Arc::new(
        ScriptedProvider::for_corpus()
            .with_failure(&["Extract every substantive claim", "DOCUMENT: hv_note.pdf"])
            .with_override(
                &["Extract every substantive claim", "DOCUMENT: psych_report.pdf"],
                json!({"claims": "not-a-list"}),
            ),
    );
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    // Only the assessment produced a usable claim; with no false premise
    // anywhere, nothing propagates and no outcome can be linked
    let claims = store.get_claims(CASE_ID).unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].text, ENGAGED_CLAIM);

    let origins = store.get_origins(CASE_ID).unwrap();
    assert_eq!(origins.len(), 1);
    assert!(!origins[0].is_false_premise);

    assert!(store.get_propagations(CASE_ID).unwrap().is_empty());
    assert_eq!(store.get_markers(CASE_ID).unwrap().len(), 1);
    assert!(store.get_outcomes(CASE_ID).unwrap().is_empty());

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.error_message.is_none());
    assert_eq!(run.false_premises_found, 0);
    assert_eq!(run.propagation_chains_found, 0);
    assert_eq!(run.authority_accumulations_found, 1);
    assert_eq!(run.outcomes_linked, 0);
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn test_classification_faults_degrade_to_non_premise_origins() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(
        ScriptedProvider::for_corpus().with_failure(&["TASK: Classify the origin"]),
    );
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    let origins = store.get_origins(CASE_ID).unwrap();
    assert_eq!(origins.len(), 2);
    for origin in &origins {
        assert_eq!(origin.origin_type, OriginType::ProfessionalOpinion);
        assert!(!origin.is_false_premise);
        assert!(origin.false_premise_type.is_none());
        assert!((origin.confidence_score - 0.5).abs() < 1e-9);
    }

    // Later phases still walk and score the chain; with no tainted origin
    // and no false premise the laundering heuristics stay quiet
    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();
    assert_eq!(store.get_propagations(CASE_ID).unwrap().len(), 3);

    let markers = store.get_markers(CASE_ID).unwrap();
    assert_eq!(markers.len(), 5);
    assert_eq!(marker_for(&markers, &intox_id, DOC_ORDER).cumulative_score, 23);
    assert!(markers.iter().all(|m| !m.is_authority_laundering));

    // No premises to trace, so no outcome survives the match step
    assert!(store.get_outcomes(CASE_ID).unwrap().is_empty());

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.false_premises_found, 0);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 0);
}

// ============================================================================
// Hop detection
// ============================================================================

#[tokio::test]
async fn test_hop_fault_skips_document_and_chain_continues() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    // Every probe into the psych report dies; the walk treats the claim as
    // absent there and keeps probing from the assessment
    let provider = Arc::new(
        ScriptedProvider::for_corpus()
            .with_failure(&["reappears in the target", "TARGET: psych_report.pdf"]),
    );
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();

    let propagations = store.get_propagations(CASE_ID).unwrap();
    assert_eq!(propagations.len(), 2);
    assert_eq!(propagations[0].target_document_id, DOC_SW);
    let last = &propagations[1];
    assert_eq!(last.source_document_id, DOC_SW);
    assert_eq!(last.target_document_id, DOC_ORDER);
    assert_eq!(last.mechanism, PropagationMechanism::ImplicitAdoption);
    assert_eq!(last.original_text.as_deref(), Some(INTOX_MUTATED));

    // Three markers on the shortened chain; the total crosses the tainted
    // threshold only at the order
    let markers = store.get_markers(CASE_ID).unwrap();
    assert_eq!(markers.len(), 4);
    let order_marker = marker_for(&markers, &intox_id, DOC_ORDER);
    assert_eq!(order_marker.cumulative_score, 16);
    assert!(order_marker.is_authority_laundering);
    assert!(order_marker
        .laundering_reason
        .as_deref()
        .unwrap()
        .contains("speculation origin has accumulated authority 16"));
    assert_eq!(
        markers.iter().filter(|m| m.is_authority_laundering).count(),
        1
    );

    let outcomes = store.get_outcomes(CASE_ID).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].description, RESTRICTION_OUTCOME);

    let results = service.get_results(&run_id).unwrap();
    assert_eq!(results.causation_chains.len(), 1);
    assert_eq!(
        results.causation_chains[0].propagation_path,
        vec![
            "hv_note.pdf -> sw_assessment.pdf (paraphrase)",
            "sw_assessment.pdf -> court_order.pdf (implicit_adoption)",
        ]
    );
    assert_eq!(results.causation_chains[0].authority_accumulation, 16);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.authority_accumulations_found, 4);
    assert_eq!(run.outcomes_linked, 1);
}

// ============================================================================
// Authority scoring
// ============================================================================

#[tokio::test]
async fn test_authority_faults_score_minimal_markers_without_laundering() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(
        ScriptedProvider::for_corpus().with_failure(&["Assess the institutional authority"]),
    );
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();
    let engaged_id = claim_by_text(&claims, ENGAGED_CLAIM).id.clone();

    let markers = store.get_markers(CASE_ID).unwrap();
    assert_eq!(markers.len(), 5);
    for marker in &markers {
        assert_eq!(marker.institution, "unknown");
        assert_eq!(marker.authority_weight, 2);
        assert_eq!(marker.authority_type, AuthorityType::ProfessionalAssessment);
        assert_eq!(
            marker.endorsement_type,
            EndorsementType::ReferencedWithoutVerification
        );
        // A marker scored without provider input never carries a verdict
        assert!(!marker.is_authority_laundering);
        assert!(marker.laundering_reason.is_none());
    }
    assert_eq!(marker_for(&markers, &intox_id, DOC_HV).cumulative_score, 8);
    assert_eq!(marker_for(&markers, &engaged_id, DOC_SW).cumulative_score, 2);

    // The outcome is still linked; its chain just carries the minimal total
    let outcomes = store.get_outcomes(CASE_ID).unwrap();
    assert_eq!(outcomes.len(), 1);
    let results = service.get_results(&run_id).unwrap();
    assert_eq!(results.causation_chains[0].authority_accumulation, 8);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 1);
}

// ============================================================================
// Causation
// ============================================================================

#[tokio::test]
async fn test_causation_fault_keeps_outcome_with_uncertain_verdict() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(
        ScriptedProvider::for_corpus().with_failure(&["Assess but-for causation"]),
    );
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    let outcomes = store.get_outcomes(CASE_ID).unwrap();
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.but_for_verdict, ButForVerdict::Uncertain);
    assert!(outcome.but_for_analysis.is_none());
    assert!((outcome.causation_confidence - 0.3).abs() < 1e-9);
    assert!(outcome.remediation_possible);
    assert_eq!(
        outcome.remediation_actions,
        vec!["Re-assess this outcome once the underlying claims have been independently verified"]
    );
    // Without a causal assessment the harm description falls back to the
    // enumeration's wording
    assert_eq!(
        outcome.harm_description.as_deref(),
        Some("Loss of unsupervised contact")
    );

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.outcomes_linked, 1);
}
