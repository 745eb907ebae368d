//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling. Schema creation is idempotent; every enum-valued
//! column carries a CHECK constraint so bad writes fail at the store.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a database from an existing connection pool
    pub fn from_pool(pool: DbPool) -> AppResult<Self> {
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// Uses an in-memory SQLite database with the same schema as the
    /// production database. Useful for integration and unit tests.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create a new database instance at the given path with connection pooling
    pub fn new(db_path: impl AsRef<Path>) -> AppResult<Self> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS case_documents (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                doc_type TEXT CHECK(doc_type IN ('court_order', 'witness_statement', 'expert_report', 'police_bundle', 'social_work_assessment', 'transcript', 'correspondence', 'media', 'disclosure', 'threshold_document', 'position_statement', 'other')),
                doc_date TEXT NOT NULL,
                source_entity TEXT,
                extracted_text TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS case_entities (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sam_analyses (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'anchor_running', 'anchor_complete', 'inherit_running', 'inherit_complete', 'compound_running', 'compound_complete', 'arrive_running', 'arrive_complete', 'completed', 'failed', 'cancelled')),
                document_ids TEXT NOT NULL DEFAULT '[]',
                focus_claims TEXT NOT NULL DEFAULT '[]',
                stop_after_phase TEXT CHECK(stop_after_phase IN ('anchor', 'inherit', 'compound', 'arrive')),
                anchor_started_at TEXT,
                anchor_completed_at TEXT,
                inherit_started_at TEXT,
                inherit_completed_at TEXT,
                compound_started_at TEXT,
                compound_completed_at TEXT,
                arrive_started_at TEXT,
                arrive_completed_at TEXT,
                false_premises_found INTEGER NOT NULL DEFAULT 0,
                propagation_chains_found INTEGER NOT NULL DEFAULT 0,
                authority_accumulations_found INTEGER NOT NULL DEFAULT 0,
                outcomes_linked INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                error_phase TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS claims (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                author TEXT,
                category TEXT NOT NULL CHECK(category IN ('factual', 'opinion', 'finding', 'recommendation', 'conclusion', 'allegation')),
                foundation TEXT NOT NULL CHECK(foundation IN ('verified', 'supported', 'unsupported', 'contested', 'circular', 'contaminated', 'unfounded')),
                source_document_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(case_id, normalized_text),
                FOREIGN KEY (source_document_id) REFERENCES case_documents(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS claim_origins (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                claim_id TEXT NOT NULL UNIQUE,
                origin_document_id TEXT NOT NULL,
                origin_date TEXT NOT NULL,
                origin_context TEXT,
                origin_type TEXT NOT NULL CHECK(origin_type IN ('primary_source', 'professional_opinion', 'hearsay', 'speculation', 'misattribution', 'fabrication')),
                is_false_premise INTEGER NOT NULL DEFAULT 0,
                false_premise_type TEXT CHECK(false_premise_type IN ('factual_error', 'misattribution', 'speculation_as_fact', 'context_stripping', 'selective_quotation', 'temporal_distortion')),
                contradicting_evidence TEXT,
                confidence_score REAL NOT NULL DEFAULT 0.5,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (claim_id) REFERENCES claims(id),
                FOREIGN KEY (origin_document_id) REFERENCES case_documents(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS claim_propagations (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                claim_id TEXT NOT NULL,
                source_document_id TEXT NOT NULL,
                source_date TEXT NOT NULL,
                target_document_id TEXT NOT NULL,
                target_date TEXT NOT NULL,
                mechanism TEXT NOT NULL CHECK(mechanism IN ('verbatim', 'paraphrase', 'citation', 'implicit_adoption', 'circular_reference', 'authority_appeal')),
                verification_performed INTEGER NOT NULL DEFAULT 0,
                verification_method TEXT,
                verification_outcome TEXT,
                crossed_institutional_boundary INTEGER NOT NULL DEFAULT 0,
                mutation_detected INTEGER NOT NULL DEFAULT 0,
                mutation_type TEXT CHECK(mutation_type IN ('amplification', 'attenuation', 'certainty_drift', 'attribution_shift', 'scope_expansion', 'scope_contraction')),
                original_text TEXT,
                mutated_text TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(claim_id, source_document_id, target_document_id),
                FOREIGN KEY (claim_id) REFERENCES claims(id),
                FOREIGN KEY (source_document_id) REFERENCES case_documents(id),
                FOREIGN KEY (target_document_id) REFERENCES case_documents(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS authority_markers (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                claim_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                authority_date TEXT NOT NULL,
                institution TEXT NOT NULL,
                authority_type TEXT NOT NULL CHECK(authority_type IN ('court_finding', 'expert_opinion', 'official_report', 'professional_assessment', 'police_conclusion', 'agency_determination')),
                authority_weight INTEGER NOT NULL DEFAULT 1,
                endorsement_type TEXT NOT NULL CHECK(endorsement_type IN ('explicit_adoption', 'implicit_reliance', 'qualified_acceptance', 'referenced_without_verification')),
                is_authority_laundering INTEGER NOT NULL DEFAULT 0,
                laundering_reason TEXT,
                cumulative_score INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(claim_id, document_id),
                FOREIGN KEY (claim_id) REFERENCES claims(id),
                FOREIGN KEY (document_id) REFERENCES case_documents(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sam_outcomes (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                outcome_type TEXT NOT NULL CHECK(outcome_type IN ('court_order', 'finding_of_fact', 'recommendation', 'agency_decision', 'regulatory_action', 'media_publication')),
                description TEXT NOT NULL,
                outcome_date TEXT,
                harm_level TEXT NOT NULL CHECK(harm_level IN ('catastrophic', 'severe', 'moderate', 'minor')),
                harm_description TEXT,
                supporting_claims TEXT NOT NULL DEFAULT '[]',
                root_claim_ids TEXT NOT NULL DEFAULT '[]',
                but_for_verdict TEXT NOT NULL DEFAULT 'uncertain' CHECK(but_for_verdict IN ('definitely_not', 'probably_not', 'uncertain', 'probably_yes', 'definitely_yes')),
                but_for_analysis TEXT,
                causation_confidence REAL NOT NULL DEFAULT 0.5,
                remediation_possible INTEGER NOT NULL DEFAULT 1,
                remediation_actions TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(document_id, description),
                FOREIGN KEY (document_id) REFERENCES case_documents(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_case_documents_case_id ON case_documents(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_case_entities_case_id ON case_entities(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sam_analyses_case_id ON sam_analyses(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sam_analyses_status ON sam_analyses(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_claims_case_id ON claims(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_claim_origins_case_id ON claim_origins(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_claim_propagations_case_id ON claim_propagations(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_claim_propagations_claim_id ON claim_propagations(claim_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_authority_markers_case_id ON authority_markers(case_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_authority_markers_claim_id ON authority_markers(claim_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sam_outcomes_case_id ON sam_outcomes(case_id)",
            [],
        )?;

        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        Ok(())
    }

    /// Get a pooled connection
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
