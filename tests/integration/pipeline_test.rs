//! Full Pipeline Integration Tests
//!
//! Runs the four-phase analysis end to end over the scripted four-document
//! corpus and checks:
//! - Phase events arrive in order and the run record reaches `completed`
//! - ANCHOR persists claims and classified origins
//! - INHERIT builds the propagation chain, carrying mutated wording forward
//! - COMPOUND reconciles weights, accumulates authority, and flags
//!   laundering on the right markers only
//! - ARRIVE persists only premise-linked outcomes and derives the causation
//!   chain
//! - Focus claims restrict ANCHOR to matching clusters

use std::sync::Arc;

use claimtrace::models::{
    AuthorityType, ButForVerdict, EndorsementType, FalsePremiseType, HarmLevel, MutationType,
    OriginType, OutcomeType, PropagationMechanism, RunStatus,
};
use claimtrace::storage::SqliteLineageStore;
use claimtrace::{LineageStore, PipelineEvent, PipelineService, SamPhase};

use crate::support::{
    build_service, claim_by_text, drain_until_terminal, in_memory_store, marker_for, seed_corpus,
    ScriptedProvider, CASE_ID, DOC_HV, DOC_ORDER, DOC_PSYCH, DOC_SW, ENGAGED_CLAIM, INTOX_CLAIM,
    INTOX_CONTEXT, INTOX_MUTATED, RESTRICTION_HARM, RESTRICTION_OUTCOME,
};

// ============================================================================
// Helpers
// ============================================================================

/// Run the standard corpus to completion and hand back everything a test
/// needs to poke at.
async fn run_corpus() -> (
    Arc<SqliteLineageStore>,
    Arc<ScriptedProvider>,
    PipelineService,
    String,
    Vec<PipelineEvent>,
) {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    (store, provider, service, run_id, events)
}

// ============================================================================
// Full run
// ============================================================================

#[tokio::test]
async fn test_full_run_completes_with_phase_events_in_order() {
    let (store, _provider, _service, run_id, events) = run_corpus().await;

    let expected: Vec<PipelineEvent> = [
        SamPhase::Anchor,
        SamPhase::Inherit,
        SamPhase::Compound,
        SamPhase::Arrive,
    ]
    .iter()
    .flat_map(|&phase| {
        [
            PipelineEvent::PhaseStarted {
                run_id: run_id.clone(),
                phase,
            },
            PipelineEvent::PhaseCompleted {
                run_id: run_id.clone(),
                phase,
            },
        ]
    })
    .chain([PipelineEvent::RunCompleted {
        run_id: run_id.clone(),
    }])
    .collect();
    assert_eq!(events, expected);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    for phase in SamPhase::all() {
        assert!(
            run.phase_started_at(phase).is_some(),
            "{phase} started_at unset"
        );
        assert!(
            run.phase_completed_at(phase).is_some(),
            "{phase} completed_at unset"
        );
    }
    assert!(run.error_message.is_none());
    assert!(run.error_phase.is_none());

    assert_eq!(run.false_premises_found, 1);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 1);
}

#[tokio::test]
async fn test_anchor_persists_claims_and_classified_origins() {
    let (store, provider, _service, _run_id, _events) = run_corpus().await;

    // One extraction call per document, one classification per cluster
    assert_eq!(provider.calls_matching("Extract every substantive claim"), 4);
    assert_eq!(provider.calls_matching("Classify the origin"), 2);

    let claims = store.get_claims(CASE_ID).unwrap();
    assert_eq!(claims.len(), 2);
    let intox = claim_by_text(&claims, INTOX_CLAIM);
    assert_eq!(intox.source_document_id, DOC_HV);
    assert_eq!(intox.author.as_deref(), Some("HV Patel"));
    let engaged = claim_by_text(&claims, ENGAGED_CLAIM);
    assert_eq!(engaged.source_document_id, DOC_SW);

    // Origins come back in origin-date order
    let origins = store.get_origins(CASE_ID).unwrap();
    assert_eq!(origins.len(), 2);
    let premise = &origins[0];
    assert_eq!(premise.claim_id, intox.id);
    assert_eq!(premise.origin_document_id, DOC_HV);
    assert_eq!(premise.origin_date, "2025-01-05");
    assert_eq!(premise.origin_type, OriginType::Speculation);
    assert!(premise.is_false_premise);
    assert_eq!(
        premise.false_premise_type,
        Some(FalsePremiseType::SpeculationAsFact)
    );
    assert_eq!(premise.origin_context.as_deref(), Some(INTOX_CONTEXT));
    assert_eq!(
        premise.contradicting_evidence.as_deref(),
        Some("The contact centre log for 5 January records no concerns")
    );
    assert!((premise.confidence_score - 0.9).abs() < 1e-9);

    let benign = &origins[1];
    assert_eq!(benign.claim_id, engaged.id);
    assert_eq!(benign.origin_type, OriginType::ProfessionalOpinion);
    assert!(!benign.is_false_premise);
    assert!(benign.false_premise_type.is_none());
}

#[tokio::test]
async fn test_inherit_builds_chain_and_carries_mutated_text() {
    let (store, provider, _service, _run_id, _events) = run_corpus().await;

    // The benign claim is probed against its 2 later documents, the premise
    // against its 3
    assert_eq!(provider.calls_matching("reappears in the target"), 5);

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();

    let propagations = store.get_propagations(CASE_ID).unwrap();
    assert_eq!(propagations.len(), 3);
    assert!(propagations.iter().all(|p| p.claim_id == intox_id));

    // Source-date order: note -> assessment -> report -> order
    let first = &propagations[0];
    assert_eq!(first.source_document_id, DOC_HV);
    assert_eq!(first.target_document_id, DOC_SW);
    assert_eq!(first.mechanism, PropagationMechanism::Paraphrase);
    assert!(!first.verification_performed);
    assert!(first.crossed_institutional_boundary);
    assert!(first.mutation_detected);
    assert_eq!(first.mutation_type, Some(MutationType::CertaintyDrift));
    assert_eq!(first.original_text.as_deref(), Some(INTOX_CLAIM));
    assert_eq!(first.mutated_text.as_deref(), Some(INTOX_MUTATED));

    // The second hop matched on the mutated wording, proving the walk
    // carries the drifted text forward
    let second = &propagations[1];
    assert_eq!(second.source_document_id, DOC_SW);
    assert_eq!(second.target_document_id, DOC_PSYCH);
    assert_eq!(second.mechanism, PropagationMechanism::Citation);
    assert!(second.verification_performed);
    assert_eq!(
        second.verification_method.as_deref(),
        Some("review of the contact centre records")
    );
    assert!(!second.mutation_detected);
    assert_eq!(second.original_text.as_deref(), Some(INTOX_MUTATED));
    assert!(second.mutated_text.is_none());

    let third = &propagations[2];
    assert_eq!(third.source_document_id, DOC_PSYCH);
    assert_eq!(third.target_document_id, DOC_ORDER);
    assert_eq!(third.mechanism, PropagationMechanism::ImplicitAdoption);
    assert!(!third.verification_performed);
    assert_eq!(third.original_text.as_deref(), Some(INTOX_MUTATED));
}

#[tokio::test]
async fn test_compound_accumulates_authority_and_flags_laundering() {
    let (store, _provider, _service, _run_id, _events) = run_corpus().await;

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();
    let engaged_id = claim_by_text(&claims, ENGAGED_CLAIM).id.clone();

    let markers = store.get_markers(CASE_ID).unwrap();
    assert_eq!(markers.len(), 5);

    // Weight estimates within 2 of the institution table stand as given;
    // every marker of a finished chain carries the chain's final total
    let origin_marker = marker_for(&markers, &intox_id, DOC_HV);
    assert_eq!(origin_marker.institution, "Health Visiting Team");
    assert_eq!(origin_marker.authority_type, AuthorityType::OfficialReport);
    assert_eq!(origin_marker.authority_weight, 3);
    assert_eq!(origin_marker.endorsement_type, EndorsementType::ExplicitAdoption);
    assert_eq!(origin_marker.cumulative_score, 23);
    assert!(!origin_marker.is_authority_laundering);

    let sw_marker = marker_for(&markers, &intox_id, DOC_SW);
    assert_eq!(sw_marker.institution, "Local Authority Social Work Team");
    assert_eq!(sw_marker.authority_weight, 4);
    assert_eq!(sw_marker.cumulative_score, 23);
    assert!(!sw_marker.is_authority_laundering);

    // Running total hits 14 here: past the false-premise threshold
    let psych_marker = marker_for(&markers, &intox_id, DOC_PSYCH);
    assert_eq!(psych_marker.authority_type, AuthorityType::ExpertOpinion);
    assert_eq!(psych_marker.authority_weight, 7);
    assert_eq!(psych_marker.cumulative_score, 23);
    assert!(psych_marker.is_authority_laundering);
    assert!(psych_marker
        .laundering_reason
        .as_deref()
        .unwrap()
        .contains("false premise has accumulated authority 14"));

    // Running total hits 23: the tainted-origin heuristic outranks the
    // false-premise one
    let order_marker = marker_for(&markers, &intox_id, DOC_ORDER);
    assert_eq!(order_marker.authority_type, AuthorityType::CourtFinding);
    assert_eq!(order_marker.authority_weight, 9);
    assert_eq!(order_marker.cumulative_score, 23);
    assert!(order_marker.is_authority_laundering);
    assert!(order_marker
        .laundering_reason
        .as_deref()
        .unwrap()
        .contains("speculation origin has accumulated authority 23"));

    // The benign single-document chain accumulates nothing suspicious
    let benign_marker = marker_for(&markers, &engaged_id, DOC_SW);
    assert_eq!(benign_marker.authority_weight, 4);
    assert_eq!(benign_marker.endorsement_type, EndorsementType::ExplicitAdoption);
    assert_eq!(benign_marker.cumulative_score, 4);
    assert!(!benign_marker.is_authority_laundering);

    assert_eq!(
        markers.iter().filter(|m| m.is_authority_laundering).count(),
        2
    );
}

#[tokio::test]
async fn test_arrive_links_outcome_and_drops_unmatched_candidate() {
    let (store, provider, _service, _run_id, _events) = run_corpus().await;

    // Only decision-bearing documents are enumerated; the health visitor
    // note is correspondence and skipped
    assert_eq!(
        provider.calls_matching("Identify every consequential decision"),
        3
    );
    // Causation is only assessed for candidates that matched a premise
    assert_eq!(provider.calls_matching("Assess but-for causation"), 1);

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();

    // The fee-remission candidate shares no wording with the premise and
    // is dropped before persistence
    let outcomes = store.get_outcomes(CASE_ID).unwrap();
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.document_id, DOC_ORDER);
    assert_eq!(outcome.outcome_type, OutcomeType::CourtOrder);
    assert_eq!(outcome.description, RESTRICTION_OUTCOME);
    assert_eq!(outcome.outcome_date.as_deref(), Some("2025-04-20"));
    assert_eq!(outcome.harm_level, HarmLevel::Severe);
    assert_eq!(outcome.harm_description.as_deref(), Some(RESTRICTION_HARM));
    assert_eq!(outcome.supporting_claims, vec![INTOX_MUTATED, INTOX_CLAIM]);
    assert_eq!(outcome.root_claim_ids, vec![intox_id]);
    assert_eq!(outcome.but_for_verdict, ButForVerdict::ProbablyNot);
    assert!((outcome.causation_confidence - 0.8).abs() < 1e-9);
    assert!(outcome.remediation_possible);
    assert_eq!(outcome.remediation_actions.len(), 2);
    assert_eq!(
        outcome.remediation_actions[0],
        "Obtain the contact centre log for the 5 January session"
    );
}

#[tokio::test]
async fn test_results_derive_subsets_and_causation_chain() {
    let (store, _provider, service, run_id, _events) = run_corpus().await;

    let claims = store.get_claims(CASE_ID).unwrap();
    let intox_id = claim_by_text(&claims, INTOX_CLAIM).id.clone();

    let results = service.get_results(&run_id).unwrap();
    assert_eq!(results.origins.len(), 2);
    assert_eq!(results.false_premises.len(), 1);
    assert_eq!(results.false_premises[0].claim_id, intox_id);
    assert_eq!(results.propagations.len(), 3);
    assert_eq!(results.verification_gaps.len(), 2);
    assert!(results.circular_references.is_empty());
    assert_eq!(results.mutations.len(), 1);
    assert_eq!(
        results.mutations[0].mutation_type,
        Some(MutationType::CertaintyDrift)
    );
    assert_eq!(results.authority_markers.len(), 5);
    assert_eq!(results.authority_laundering.len(), 2);
    assert_eq!(results.outcomes.len(), 1);

    assert_eq!(results.causation_chains.len(), 1);
    let chain = &results.causation_chains[0];
    assert_eq!(chain.outcome_id, results.outcomes[0].id);
    assert_eq!(chain.root_claim_ids, vec![intox_id]);
    assert_eq!(
        chain.propagation_path,
        vec![
            "hv_note.pdf -> sw_assessment.pdf (paraphrase)",
            "sw_assessment.pdf -> psych_report.pdf (citation)",
            "psych_report.pdf -> court_order.pdf (implicit_adoption)",
        ]
    );
    assert_eq!(chain.authority_accumulation, 23);
}

// ============================================================================
// Focus claims
// ============================================================================

#[tokio::test]
async fn test_focus_claims_restrict_anchor_to_matching_clusters() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, vec!["intoxicated".to_string()], None)
        .await
        .unwrap();
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    // Extraction still covers every document; only the matching cluster is
    // classified and carried through
    assert_eq!(provider.calls_matching("Extract every substantive claim"), 4);
    assert_eq!(provider.calls_matching("Classify the origin"), 1);

    let claims = store.get_claims(CASE_ID).unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].text, INTOX_CLAIM);
    assert_eq!(store.get_origins(CASE_ID).unwrap().len(), 1);
    assert_eq!(store.get_propagations(CASE_ID).unwrap().len(), 3);
    assert_eq!(store.get_markers(CASE_ID).unwrap().len(), 4);
    assert_eq!(store.get_outcomes(CASE_ID).unwrap().len(), 1);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.false_premises_found, 1);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(run.authority_accumulations_found, 4);
    assert_eq!(run.outcomes_linked, 1);
}
