//! Pipeline stages that consume analysis output: safe strategy, rollback,
//! and the orchestrating engine

pub mod orchestrator;
pub mod rollback;
pub mod strategy;

pub use orchestrator::{
    ConfidenceLevel, ConfidenceScore, SafeMigrationEngine, SafeMigrationSimulation,
    SimulationOutcome,
};
pub use rollback::{generate_rollback, RollbackPlan};
pub use strategy::{generate_safe_strategy, SafeStrategyPlan, StrategyPhase};
