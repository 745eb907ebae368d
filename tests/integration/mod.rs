//! Integration Tests Module
//!
//! End-to-end tests for the claim-lineage pipeline, run against an
//! in-memory store and a scripted analysis provider so every run is
//! deterministic and offline. Covers full four-phase runs, stop-after and
//! resume, failure recovery, cancellation, and degraded-analysis handling.


// Full four-phase runs over the worked example corpus
mod pipeline_test;

// Stop-after, failure recovery, cancellation, and resume preconditions
mod resume_test;

// Per-step provider faults degrading instead of aborting the run
mod degrade_test;
