//! Error handling module
//!
//! Provides the unified error type for the simulation engine. Nothing in the
//! pipeline is allowed to escape past the orchestrator boundary: per-statement
//! failures are absorbed inside the diff builder, and everything else is
//! converted into an `ok: false` outcome.

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid snapshot payload: {0}")]
    Snapshot(String),

    #[error("Migration script is empty")]
    EmptyScript,

    #[error("Migration script too large: {statements} statements (limit {limit})")]
    ScriptTooLarge { statements: usize, limit: usize },

    #[error("Failed to apply statement: {0}")]
    Apply(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Helper function to create a snapshot validation error
pub fn snapshot_error(msg: impl Into<String>) -> EngineError {
    EngineError::Snapshot(msg.into())
}

/// Helper function to create a statement application error
pub fn apply_error(msg: impl Into<String>) -> EngineError {
    EngineError::Apply(msg.into())
}
