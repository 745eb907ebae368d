//! Pipeline Service
//!
//! The orchestrator. Owns the run lifecycle: validates inputs, creates the
//! run record, executes the four phases strictly in order on a background
//! task, and exposes cancel/resume/progress/results to the host
//! application. Completed phases are never re-run; a resumed execution
//! re-loads their persisted rows into `PhaseResults` and picks up at the
//! first phase whose completion timestamp is unset.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{AnalysisRun, CaseDocument, RunStatus, SamPhase, SamResults};
use crate::storage::LineageStore;
use crate::utils::error::{AppError, AppResult};
use claimtrace_analysis::AnalysisProvider;

use super::context::{
    AnchorOutput, CompoundOutput, InheritOutput, PhaseContext, PhaseResults, PipelineConfig,
    PipelineEvent, RunProgress,
};
use super::{anchor, arrive, compound, inherit};

/// Orchestrates analysis runs over a lineage store and an analysis provider.
///
/// Cheap to clone; clones share the store, the provider, and the
/// cancellation-token registry.
#[derive(Clone)]
pub struct PipelineService {
    store: Arc<dyn LineageStore>,
    provider: Arc<dyn AnalysisProvider>,
    config: PipelineConfig,
    /// Cancellation tokens for in-flight executions, keyed by run id
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// Optional lifecycle channel; sends are best-effort
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineService {
    pub fn new(
        store: Arc<dyn LineageStore>,
        provider: Arc<dyn AnalysisProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            events: None,
        }
    }

    /// Attach a lifecycle event channel
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the inputs, persist a pending run, and start executing it
    /// on a background task. Returns the new run's id immediately; callers
    /// follow the execution via `get_progress` or the event channel.
    pub async fn start_run(
        &self,
        case_id: &str,
        document_ids: Vec<String>,
        focus_claims: Vec<String>,
        stop_after_phase: Option<SamPhase>,
    ) -> AppResult<String> {
        if document_ids.is_empty() {
            return Err(AppError::validation(
                "an analysis run needs at least one document",
            ));
        }
        if !self.provider.is_configured() {
            return Err(AppError::validation(format!(
                "analysis provider '{}' is not configured",
                self.provider.name()
            )));
        }
        let documents = self.load_documents(case_id, &document_ids)?;

        let mut run = AnalysisRun::new(case_id, document_ids).with_focus_claims(focus_claims);
        if let Some(phase) = stop_after_phase {
            run = run.with_stop_after(phase);
        }
        self.store.insert_run(&run)?;
        info!(
            run_id = %run.id,
            case_id,
            documents = documents.len(),
            "analysis run created"
        );

        let run_id = run.id.clone();
        let cancel = CancellationToken::new();
        self.tokens.lock().await.insert(run_id.clone(), cancel.clone());
        self.spawn_execution(run, SamPhase::Anchor, documents, cancel);
        Ok(run_id)
    }

    /// Resume an interrupted run from the first phase whose completion
    /// timestamp is unset. Returns the phase execution restarted from, or
    /// `None` when every phase had already completed and the run only
    /// needed its terminal status written.
    pub async fn resume_run(&self, run_id: &str) -> AppResult<Option<SamPhase>> {
        if self.tokens.lock().await.contains_key(run_id) {
            return Err(AppError::invalid_state(format!(
                "run '{run_id}' is still executing"
            )));
        }
        let run = self.store.get_run(run_id)?;
        if !run.is_resumable() {
            return Err(AppError::invalid_state(format!(
                "run '{run_id}' already completed and cannot be resumed"
            )));
        }

        let Some(next) = run.next_phase() else {
            // All four phases finished before the terminal status was
            // written; nothing is left to execute. A cancelled status must
            // be lifted first or the terminal write is a no-op.
            self.store.set_run_status(run_id, RunStatus::Pending)?;
            self.store.set_run_completed(run_id)?;
            self.emit(PipelineEvent::RunCompleted {
                run_id: run_id.to_string(),
            })
            .await;
            info!(run_id, "run promoted to completed, no phases outstanding");
            return Ok(None);
        };

        let documents = self.load_documents(&run.case_id, &run.document_ids)?;

        // Lift a failed/cancelled status so phase writes apply again
        self.store.set_run_status(run_id, RunStatus::Pending)?;
        info!(run_id, phase = %next, "resuming run");

        let cancel = CancellationToken::new();
        self.tokens.lock().await.insert(run_id.to_string(), cancel.clone());
        self.spawn_execution(run, next, documents, cancel);
        Ok(Some(next))
    }

    /// Cancel a run: fire its token (if an execution is in flight) and mark
    /// the record cancelled. Returns false when the run was already
    /// terminal.
    pub async fn cancel_run(&self, run_id: &str) -> AppResult<bool> {
        // Existence check so a typo'd id surfaces as NotFound
        self.store.get_run(run_id)?;

        let token = self.tokens.lock().await.get(run_id).cloned();
        if let Some(token) = token {
            token.cancel();
        }
        let cancelled = self.store.set_run_cancelled(run_id)?;
        if cancelled {
            self.emit(PipelineEvent::RunCancelled {
                run_id: run_id.to_string(),
            })
            .await;
            info!(run_id, "run cancelled");
        }
        Ok(cancelled)
    }

    /// Status snapshot for polling callers
    pub fn get_progress(&self, run_id: &str) -> AppResult<RunProgress> {
        let run = self.store.get_run(run_id)?;
        Ok(RunProgress::from_run(run))
    }

    /// Everything persisted for the run's case, with the derived subsets
    /// and causation chains. Fully meaningful once the run completed; a run
    /// stopped earlier returns whatever its finished phases persisted.
    pub fn get_results(&self, run_id: &str) -> AppResult<SamResults> {
        let run = self.store.get_run(run_id)?;
        let origins = self.store.get_origins(&run.case_id)?;
        let propagations = self.store.get_propagations(&run.case_id)?;
        let markers = self.store.get_markers(&run.case_id)?;
        let outcomes = self.store.get_outcomes(&run.case_id)?;

        // Markers all carry the final cumulative score once their chain is
        // done, so any marker of a claim can stand in for the chain total.
        let final_scores: HashMap<String, i64> = markers
            .iter()
            .map(|m| (m.claim_id.clone(), m.cumulative_score))
            .collect();
        let document_names: HashMap<String, String> = self
            .store
            .get_documents(&run.case_id, &run.document_ids)?
            .into_iter()
            .map(|d| (d.id, d.filename))
            .collect();
        let causation_chains = outcomes
            .iter()
            .map(|o| arrive::build_causation_chain(o, &propagations, &final_scores, &document_names))
            .collect();

        Ok(SamResults::assemble(
            origins,
            propagations,
            markers,
            outcomes,
            causation_chains,
        ))
    }

    /// Load a run's documents and check they are analyzable: every id must
    /// exist in the case and carry extracted text.
    fn load_documents(
        &self,
        case_id: &str,
        document_ids: &[String],
    ) -> AppResult<Vec<CaseDocument>> {
        let documents = self.store.get_documents(case_id, document_ids)?;
        let found: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        if let Some(missing) = document_ids.iter().find(|id| !found.contains(id.as_str())) {
            return Err(AppError::not_found(format!(
                "document '{missing}' does not exist in case '{case_id}'"
            )));
        }
        if let Some(doc) = documents.iter().find(|d| !d.has_text()) {
            return Err(AppError::validation(format!(
                "document '{}' has no extracted text",
                doc.filename
            )));
        }
        Ok(documents)
    }

    fn spawn_execution(
        &self,
        run: AnalysisRun,
        first: SamPhase,
        documents: Vec<CaseDocument>,
        cancel: CancellationToken,
    ) {
        let service = self.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute(run, first, documents, cancel).await {
                if e.is_cancelled() {
                    info!(run_id = %run_id, "execution stopped by cancellation");
                } else {
                    error!(run_id = %run_id, error = %e, "analysis run aborted");
                }
            }
            service.tokens.lock().await.remove(&run_id);
        });
    }

    /// Run a run's phases in order, starting at `first`. Phase-fatal errors
    /// are recorded on the run and re-raised; cancellation unwinds without
    /// touching the status (the canceller already wrote it).
    async fn execute(
        &self,
        run: AnalysisRun,
        first: SamPhase,
        documents: Vec<CaseDocument>,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        let entities = match self.store.get_entities(&run.case_id) {
            Ok(entities) => entities,
            Err(e) => return self.fail_run(&run.id, first, e).await,
        };
        let ctx = Arc::new(PhaseContext {
            run_id: run.id.clone(),
            case_id: run.case_id.clone(),
            documents,
            entities,
            focus_claims: run.focus_claims.clone(),
            config: self.config.clone(),
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            cancel,
        });
        let mut results = match self.reload_completed(&run) {
            Ok(results) => results,
            Err(e) => return self.fail_run(&run.id, first, e).await,
        };

        let mut phase = Some(first);
        while let Some(current) = phase {
            if let Err(e) = self.run_single_phase(&ctx, current, &mut results).await {
                if e.is_cancelled() {
                    return Err(e);
                }
                return self.fail_run(&run.id, current, e).await;
            }
            if run.stop_after_phase == Some(current) && current.next().is_some() {
                info!(run_id = %run.id, phase = %current, "stop-after limit reached, leaving run partial");
                return Ok(());
            }
            phase = current.next();
        }

        ctx.check_cancelled()?;
        if let Err(e) = self.store.set_run_completed(&run.id) {
            return self.fail_run(&run.id, SamPhase::Arrive, e).await;
        }
        self.emit(PipelineEvent::RunCompleted {
            run_id: run.id.clone(),
        })
        .await;
        info!(run_id = %run.id, "analysis run completed");
        Ok(())
    }

    /// Bracketed execution of one phase: status/timestamp writes, the phase
    /// handler, the summary counter, and lifecycle events.
    async fn run_single_phase(
        &self,
        ctx: &Arc<PhaseContext>,
        phase: SamPhase,
        results: &mut PhaseResults,
    ) -> AppResult<()> {
        ctx.check_cancelled()?;
        self.store.set_phase_started(&ctx.run_id, phase)?;
        self.emit(PipelineEvent::PhaseStarted {
            run_id: ctx.run_id.clone(),
            phase,
        })
        .await;
        info!(run_id = %ctx.run_id, phase = %phase, "phase started");

        let counter = match phase {
            SamPhase::Anchor => {
                let output = anchor::run(Arc::clone(ctx)).await?;
                let counter = output.false_premise_count();
                results.anchor = Some(output);
                counter
            }
            SamPhase::Inherit => {
                let output = inherit::run(Arc::clone(ctx), results.require_anchor()?).await?;
                let counter = output.chains_found;
                results.inherit = Some(output);
                counter
            }
            SamPhase::Compound => {
                let output = compound::run(
                    Arc::clone(ctx),
                    results.require_anchor()?,
                    results.require_inherit()?,
                )
                .await?;
                let counter = output.markers.len() as u32;
                results.compound = Some(output);
                counter
            }
            SamPhase::Arrive => {
                let output = arrive::run(
                    Arc::clone(ctx),
                    results.require_anchor()?,
                    results.require_inherit()?,
                    results.require_compound()?,
                )
                .await?;
                let counter = output.outcomes.len() as u32;
                results.arrive = Some(output);
                counter
            }
        };

        // A token that fired while the handler was finishing its last units
        // must win over the phase-complete write
        ctx.check_cancelled()?;
        self.store.set_phase_completed(&ctx.run_id, phase)?;
        self.store.set_phase_counter(&ctx.run_id, phase, counter)?;
        self.emit(PipelineEvent::PhaseCompleted {
            run_id: ctx.run_id.clone(),
            phase,
        })
        .await;
        info!(run_id = %ctx.run_id, phase = %phase, counter, "phase completed");
        Ok(())
    }

    /// Rebuild the outputs of already-completed phases from their persisted
    /// rows so later phases see the same inputs a fresh execution would.
    /// ARRIVE output feeds nothing downstream and is not re-loaded.
    fn reload_completed(&self, run: &AnalysisRun) -> AppResult<PhaseResults> {
        let mut results = PhaseResults::default();

        if run.phase_completed_at(SamPhase::Anchor).is_some() {
            let origins = self.store.get_origins(&run.case_id)?;
            let claims_analyzed = self.store.get_claims(&run.case_id)?.len() as u32;
            let aggregate_confidence = if origins.is_empty() {
                0.0
            } else {
                let sum: f64 = origins.iter().map(|o| o.confidence_score).sum();
                (sum / origins.len() as f64 * 100.0).round() / 100.0
            };
            results.anchor = Some(AnchorOutput {
                origins,
                claims_analyzed,
                aggregate_confidence,
            });
        }

        if run.phase_completed_at(SamPhase::Inherit).is_some() {
            let propagations = self.store.get_propagations(&run.case_id)?;
            let chains_found = propagations
                .iter()
                .map(|p| p.claim_id.as_str())
                .collect::<HashSet<_>>()
                .len() as u32;
            results.inherit = Some(InheritOutput {
                propagations,
                chains_found,
            });
        }

        if run.phase_completed_at(SamPhase::Compound).is_some() {
            let markers = self.store.get_markers(&run.case_id)?;
            let final_scores: HashMap<String, i64> = markers
                .iter()
                .map(|m| (m.claim_id.clone(), m.cumulative_score))
                .collect();
            results.compound = Some(CompoundOutput {
                markers,
                final_scores,
            });
        }

        Ok(results)
    }

    /// Record a phase-fatal failure on the run and re-raise the error
    async fn fail_run(&self, run_id: &str, phase: SamPhase, error: AppError) -> AppResult<()> {
        warn!(run_id, phase = %phase, error = %error, "phase failed, marking run failed");
        if let Err(persist) = self.store.set_run_failed(run_id, phase, &error.to_string()) {
            error!(run_id, error = %persist, "could not record run failure");
        }
        self.emit(PipelineEvent::RunFailed {
            run_id: run_id.to_string(),
            phase,
            message: error.to_string(),
        })
        .await;
        Err(error)
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
