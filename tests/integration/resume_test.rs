//! Resume and Cancellation Integration Tests
//!
//! Exercises the recovery surface end to end:
//! - A run stopped after ANCHOR resumes from INHERIT without re-running
//!   the earlier phase
//! - A run that failed mid-INHERIT resumes, dedupes the propagation it had
//!   already persisted, and completes
//! - A run that failed before COMPOUND resumes with ANCHOR and INHERIT
//!   rebuilt from their persisted rows
//! - Cancelling mid-INHERIT stops the walk, keeps the completed phases,
//!   and leaves the run resumable
//! - Resume refuses a run whose documents lost their extracted text

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use claimtrace::models::{
    ClaimOrigin, ClaimPropagation, FalsePremiseType, MutationType, OriginType,
    PropagationMechanism, RunStatus,
};
use claimtrace::storage::SqliteLineageStore;
use claimtrace::utils::text::normalize_claim;
use claimtrace::{AnalysisRun, AppError, Claim, LineageStore, PipelineEvent, SamPhase};

use crate::support::{
    build_service, drain_until_terminal, in_memory_store, marker_for, next_event,
    resume_when_idle, seed_corpus, ScriptedProvider, CASE_ID, DOC_HV, DOC_ORDER, DOC_PSYCH,
    DOC_SW, ENGAGED_CLAIM, INTOX_CLAIM, INTOX_CONTEXT, INTOX_MUTATED,
};

// ============================================================================
// Seed helpers
// ============================================================================

fn seed_claim(store: &SqliteLineageStore, text: &str, document_id: &str) -> Claim {
    let claim = Claim::new(CASE_ID, text, document_id);
    store
        .upsert_claim(&claim, &normalize_claim(text, 200))
        .unwrap()
}

/// Persist the claims and origins a finished ANCHOR phase would have left
/// behind. Returns (premise claim id, benign claim id).
fn seed_anchor_rows(store: &SqliteLineageStore) -> (String, String) {
    let intox = seed_claim(store, INTOX_CLAIM, DOC_HV);
    let engaged = seed_claim(store, ENGAGED_CLAIM, DOC_SW);

    store
        .upsert_origin(&ClaimOrigin {
            id: "origin-intox".into(),
            case_id: CASE_ID.into(),
            claim_id: intox.id.clone(),
            origin_document_id: DOC_HV.into(),
            origin_date: "2025-01-05".into(),
            origin_context: Some(INTOX_CONTEXT.into()),
            origin_type: OriginType::Speculation,
            is_false_premise: true,
            false_premise_type: Some(FalsePremiseType::SpeculationAsFact),
            contradicting_evidence: Some(
                "The contact centre log for 5 January records no concerns".into(),
            ),
            confidence_score: 0.9,
            created_at: "2025-01-05T00:00:00+00:00".into(),
        })
        .unwrap();
    store
        .upsert_origin(&ClaimOrigin {
            id: "origin-engaged".into(),
            case_id: CASE_ID.into(),
            claim_id: engaged.id.clone(),
            origin_document_id: DOC_SW.into(),
            origin_date: "2025-02-10".into(),
            origin_context: None,
            origin_type: OriginType::ProfessionalOpinion,
            is_false_premise: false,
            false_premise_type: None,
            contradicting_evidence: None,
            confidence_score: 0.7,
            created_at: "2025-02-10T00:00:00+00:00".into(),
        })
        .unwrap();

    (intox.id, engaged.id)
}

fn hop(
    id: &str,
    claim_id: &str,
    source: (&str, &str),
    target: (&str, &str),
    mechanism: PropagationMechanism,
    verified: bool,
) -> ClaimPropagation {
    ClaimPropagation {
        id: id.to_string(),
        case_id: CASE_ID.into(),
        claim_id: claim_id.to_string(),
        source_document_id: source.0.to_string(),
        source_date: source.1.to_string(),
        target_document_id: target.0.to_string(),
        target_date: target.1.to_string(),
        mechanism,
        verification_performed: verified,
        verification_method: verified.then(|| "review of the contact centre records".into()),
        verification_outcome: verified.then(|| "no contemporaneous concern recorded".into()),
        crossed_institutional_boundary: true,
        mutation_detected: false,
        mutation_type: None,
        original_text: Some(INTOX_MUTATED.into()),
        mutated_text: None,
        created_at: format!("{}T00:00:00+00:00", target.1),
    }
}

// ============================================================================
// Stop-after and resume
// ============================================================================

#[tokio::test]
async fn test_stop_after_anchor_then_resume_runs_remaining_phases() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), Some(SamPhase::Anchor))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        PipelineEvent::PhaseStarted {
            run_id: run_id.clone(),
            phase: SamPhase::Anchor,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        PipelineEvent::PhaseCompleted {
            run_id: run_id.clone(),
            phase: SamPhase::Anchor,
        }
    );

    // The run parked short of completion: ANCHOR rows persisted, later
    // phases untouched, no terminal status
    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::AnchorComplete);
    assert!(run.phase_completed_at(SamPhase::Anchor).is_some());
    assert!(run.phase_started_at(SamPhase::Inherit).is_none());
    assert_eq!(store.get_origins(CASE_ID).unwrap().len(), 2);
    assert!(store.get_propagations(CASE_ID).unwrap().is_empty());
    assert!(store.get_markers(CASE_ID).unwrap().is_empty());

    let progress = service.get_progress(&run_id).unwrap();
    assert!(progress.current_phase.is_none());
    assert_eq!(progress.next_phase, Some(SamPhase::Inherit));

    let resumed = resume_when_idle(&service, &run_id).await;
    assert_eq!(resumed, Some(SamPhase::Inherit));

    let events = drain_until_terminal(&mut rx).await;
    let expected: Vec<PipelineEvent> = [SamPhase::Inherit, SamPhase::Compound, SamPhase::Arrive]
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

    // The resumed execution never repeated ANCHOR work
    assert_eq!(provider.calls_matching("Extract every substantive claim"), 4);
    assert_eq!(provider.calls_matching("Classify the origin"), 2);
    assert_eq!(provider.calls_matching("reappears in the target"), 5);
    assert_eq!(provider.calls_matching("Assess the institutional authority"), 5);
    assert_eq!(provider.calls_matching("Identify every consequential decision"), 3);
    assert_eq!(provider.calls_matching("Assess but-for causation"), 1);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.false_premises_found, 1);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 1);
}

// ============================================================================
// Failure recovery
// ============================================================================

#[tokio::test]
async fn test_resume_after_inherit_failure_dedupes_partial_chain() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let (intox_id, _engaged_id) = seed_anchor_rows(&store);

    // The interrupted execution persisted the first hop before dying
    let mut first_hop = hop(
        "prop-seeded",
        &intox_id,
        (DOC_HV, "2025-01-05"),
        (DOC_SW, "2025-02-10"),
        PropagationMechanism::Paraphrase,
        false,
    );
    first_hop.original_text = Some(INTOX_CLAIM.into());
    first_hop.mutation_detected = true;
    first_hop.mutation_type = Some(MutationType::CertaintyDrift);
    first_hop.mutated_text = Some(INTOX_MUTATED.into());
    store.upsert_propagation(&first_hop).unwrap();

    let run = AnalysisRun::new(CASE_ID, doc_ids);
    let run_id = run.id.clone();
    store.insert_run(&run).unwrap();
    store.set_phase_started(&run_id, SamPhase::Anchor).unwrap();
    store.set_phase_completed(&run_id, SamPhase::Anchor).unwrap();
    store.set_phase_counter(&run_id, SamPhase::Anchor, 1).unwrap();
    store.set_phase_started(&run_id, SamPhase::Inherit).unwrap();
    store
        .set_run_failed(&run_id, SamPhase::Inherit, "provider connection reset")
        .unwrap();

    let failed = store.get_run(&run_id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.error_phase.as_deref(), Some("inherit"));

    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let resumed = resume_when_idle(&service, &run_id).await;
    assert_eq!(resumed, Some(SamPhase::Inherit));
    let events = drain_until_terminal(&mut rx).await;
    assert_eq!(
        events.first(),
        Some(&PipelineEvent::PhaseStarted {
            run_id: run_id.clone(),
            phase: SamPhase::Inherit,
        })
    );
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    // ANCHOR was rebuilt from its rows, not re-executed
    assert_eq!(provider.calls_matching("Extract every substantive claim"), 0);
    assert_eq!(provider.calls_matching("Classify the origin"), 0);
    assert_eq!(provider.calls_matching("reappears in the target"), 5);

    // Re-walking the chain reused the persisted hop instead of duplicating
    let propagations = store.get_propagations(CASE_ID).unwrap();
    assert_eq!(propagations.len(), 3);
    assert_eq!(
        propagations
            .iter()
            .filter(|p| p.source_document_id == DOC_HV && p.target_document_id == DOC_SW)
            .count(),
        1
    );
    assert!(propagations.iter().any(|p| p.id == "prop-seeded"));

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.error_message.is_none());
    assert!(run.error_phase.is_none());
    assert_eq!(run.false_premises_found, 1);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(store.get_markers(CASE_ID).unwrap().len(), 5);
    assert_eq!(store.get_outcomes(CASE_ID).unwrap().len(), 1);
}

#[tokio::test]
async fn test_resume_after_compound_failure_rebuilds_earlier_phases() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let (intox_id, engaged_id) = seed_anchor_rows(&store);

    let mut first_hop = hop(
        "prop-1",
        &intox_id,
        (DOC_HV, "2025-01-05"),
        (DOC_SW, "2025-02-10"),
        PropagationMechanism::Paraphrase,
        false,
    );
    first_hop.original_text = Some(INTOX_CLAIM.into());
    first_hop.mutation_detected = true;
    first_hop.mutation_type = Some(MutationType::CertaintyDrift);
    first_hop.mutated_text = Some(INTOX_MUTATED.into());
    store.upsert_propagation(&first_hop).unwrap();
    store
        .upsert_propagation(&hop(
            "prop-2",
            &intox_id,
            (DOC_SW, "2025-02-10"),
            (DOC_PSYCH, "2025-03-15"),
            PropagationMechanism::Citation,
            true,
        ))
        .unwrap();
    store
        .upsert_propagation(&hop(
            "prop-3",
            &intox_id,
            (DOC_PSYCH, "2025-03-15"),
            (DOC_ORDER, "2025-04-20"),
            PropagationMechanism::ImplicitAdoption,
            false,
        ))
        .unwrap();

    let run = AnalysisRun::new(CASE_ID, doc_ids);
    let run_id = run.id.clone();
    store.insert_run(&run).unwrap();
    for phase in [SamPhase::Anchor, SamPhase::Inherit] {
        store.set_phase_started(&run_id, phase).unwrap();
        store.set_phase_completed(&run_id, phase).unwrap();
        store.set_phase_counter(&run_id, phase, 1).unwrap();
    }
    store.set_phase_started(&run_id, SamPhase::Compound).unwrap();
    store
        .set_run_failed(&run_id, SamPhase::Compound, "provider returned HTTP 500")
        .unwrap();

    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let resumed = resume_when_idle(&service, &run_id).await;
    assert_eq!(resumed, Some(SamPhase::Compound));
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    assert_eq!(provider.calls_matching("Extract every substantive claim"), 0);
    assert_eq!(provider.calls_matching("reappears in the target"), 0);
    assert_eq!(provider.calls_matching("Assess the institutional authority"), 5);
    assert_eq!(provider.calls_matching("Identify every consequential decision"), 3);
    assert_eq!(provider.calls_matching("Assess but-for causation"), 1);

    // Scoring over the rebuilt chain matches a fresh run
    let markers = store.get_markers(CASE_ID).unwrap();
    assert_eq!(markers.len(), 5);
    assert_eq!(marker_for(&markers, &intox_id, DOC_HV).cumulative_score, 23);
    assert!(marker_for(&markers, &intox_id, DOC_PSYCH).is_authority_laundering);
    assert!(marker_for(&markers, &intox_id, DOC_ORDER).is_authority_laundering);
    assert_eq!(marker_for(&markers, &engaged_id, DOC_SW).cumulative_score, 4);

    // Chains untouched by the re-run
    assert_eq!(store.get_propagations(CASE_ID).unwrap().len(), 3);

    let outcomes = store.get_outcomes(CASE_ID).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].root_claim_ids, vec![intox_id.clone()]);

    let results = service.get_results(&run_id).unwrap();
    assert_eq!(results.causation_chains.len(), 1);
    assert_eq!(results.causation_chains[0].authority_accumulation, 23);
    assert_eq!(results.causation_chains[0].propagation_path.len(), 3);

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.false_premises_found, 1);
    assert_eq!(run.propagation_chains_found, 1);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_mid_inherit_keeps_anchor_and_allows_resume() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let (provider, mut gate) =
        ScriptedProvider::for_corpus().with_gate("reappears in the target");
    let provider = Arc::new(provider);
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut rx).await,
        PipelineEvent::PhaseStarted {
            phase: SamPhase::Anchor,
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        PipelineEvent::PhaseCompleted {
            phase: SamPhase::Anchor,
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        PipelineEvent::PhaseStarted {
            phase: SamPhase::Inherit,
            ..
        }
    ));

    // Both chain walks are now parked inside their first hop probe
    gate.reached.recv().await.unwrap();
    gate.reached.recv().await.unwrap();

    assert!(service.cancel_run(&run_id).await.unwrap());
    gate.permits.add_permits(64);

    let events = drain_until_terminal(&mut rx).await;
    assert_eq!(
        events,
        vec![PipelineEvent::RunCancelled {
            run_id: run_id.clone(),
        }]
    );

    // ANCHOR survived the cancellation; INHERIT never completed
    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.phase_completed_at(SamPhase::Anchor).is_some());
    assert!(run.phase_completed_at(SamPhase::Inherit).is_none());

    let partial = service.get_results(&run_id).unwrap();
    assert_eq!(partial.origins.len(), 2);
    assert!(partial.outcomes.is_empty());

    let resumed = resume_when_idle(&service, &run_id).await;
    assert_eq!(resumed, Some(SamPhase::Inherit));
    let events = drain_until_terminal(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunCompleted { .. })
    ));

    // Two probes were in flight when the token fired; the resumed walk
    // issued the full five
    assert_eq!(provider.calls_matching("reappears in the target"), 7);

    let propagations = store.get_propagations(CASE_ID).unwrap();
    assert_eq!(propagations.len(), 3);
    assert_eq!(
        propagations
            .iter()
            .filter(|p| p.source_document_id == DOC_HV && p.target_document_id == DOC_SW)
            .count(),
        1
    );

    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.authority_accumulations_found, 5);
    assert_eq!(run.outcomes_linked, 1);

    // Cancelling a finished run is a no-op
    assert!(!service.cancel_run(&run_id).await.unwrap());
}

// ============================================================================
// Resume preconditions
// ============================================================================

#[tokio::test]
async fn test_resume_rejects_run_whose_document_lost_its_text() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), Some(SamPhase::Anchor))
        .await
        .unwrap();
    next_event(&mut rx).await;
    next_event(&mut rx).await;

    let conn = store.database().get_connection().unwrap();
    conn.execute(
        "UPDATE case_documents SET extracted_text = NULL WHERE id = ?1",
        rusqlite::params![DOC_PSYCH],
    )
    .unwrap();

    let err = loop {
        match service.resume_run(&run_id).await {
            Err(AppError::InvalidState(m)) if m.contains("still executing") => {
                sleep(Duration::from_millis(10)).await;
            }
            Err(e) => break e,
            Ok(phase) => panic!("resume unexpectedly started at {phase:?}"),
        }
    };
    assert!(matches!(err, AppError::Validation(_)));
    assert!(err.to_string().contains("has no extracted text"));

    // The rejected resume left the run untouched and idle
    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::AnchorComplete);
}

#[tokio::test]
async fn test_resume_rejects_completed_run() {
    let store = in_memory_store();
    let doc_ids = seed_corpus(&store);
    let provider = Arc::new(ScriptedProvider::for_corpus());
    let (service, mut rx) = build_service(&store, Arc::clone(&provider));

    let run_id = service
        .start_run(CASE_ID, doc_ids, Vec::new(), None)
        .await
        .unwrap();
    drain_until_terminal(&mut rx).await;

    let err = loop {
        match service.resume_run(&run_id).await {
            Err(AppError::InvalidState(m)) if m.contains("still executing") => {
                sleep(Duration::from_millis(10)).await;
            }
            Err(e) => break e,
            Ok(phase) => panic!("resume unexpectedly started at {phase:?}"),
        }
    };
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(err.to_string().contains("already completed"));
}
