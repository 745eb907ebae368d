//! Assembled Results
//!
//! The read-only view a caller gets for a run: persisted lineage records
//! plus the derived subsets and causation chains.

use serde::{Deserialize, Serialize};

use crate::models::authority::AuthorityMarker;
use crate::models::claim::{ClaimOrigin, ClaimPropagation, PropagationMechanism};
use crate::models::outcome::{CausationChain, SamOutcome};

/// Everything the pipeline found for a run. Fully meaningful once the run
/// completed; partial for runs that stopped early (a run cancelled
/// mid-INHERIT still returns its origins).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamResults {
    pub origins: Vec<ClaimOrigin>,
    /// Origins flagged as false premises
    pub false_premises: Vec<ClaimOrigin>,
    pub propagations: Vec<ClaimPropagation>,
    /// Propagations adopted without independent verification
    pub verification_gaps: Vec<ClaimPropagation>,
    /// Propagations whose mechanism is circular reference
    pub circular_references: Vec<ClaimPropagation>,
    /// Propagations where the claim's content shifted
    pub mutations: Vec<ClaimPropagation>,
    pub authority_markers: Vec<AuthorityMarker>,
    /// Markers carrying the laundering flag
    pub authority_laundering: Vec<AuthorityMarker>,
    pub outcomes: Vec<SamOutcome>,
    pub causation_chains: Vec<CausationChain>,
}

impl SamResults {
    /// Assemble the derived subsets from the persisted record lists
    pub fn assemble(
        origins: Vec<ClaimOrigin>,
        propagations: Vec<ClaimPropagation>,
        authority_markers: Vec<AuthorityMarker>,
        outcomes: Vec<SamOutcome>,
        causation_chains: Vec<CausationChain>,
    ) -> Self {
        let false_premises = origins
            .iter()
            .filter(|o| o.is_false_premise)
            .cloned()
            .collect();
        let verification_gaps = propagations
            .iter()
            .filter(|p| !p.verification_performed)
            .cloned()
            .collect();
        let circular_references = propagations
            .iter()
            .filter(|p| p.mechanism == PropagationMechanism::CircularReference)
            .cloned()
            .collect();
        let mutations = propagations
            .iter()
            .filter(|p| p.mutation_detected)
            .cloned()
            .collect();
        let authority_laundering = authority_markers
            .iter()
            .filter(|m| m.is_authority_laundering)
            .cloned()
            .collect();
        Self {
            origins,
            false_premises,
            propagations,
            verification_gaps,
            circular_references,
            mutations,
            authority_markers,
            authority_laundering,
            outcomes,
            causation_chains,
        }
    }
}
