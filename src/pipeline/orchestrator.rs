//! Safe migration engine
//!
//! Runs the full pipeline: diff build, graph build, impact analysis, lock
//! estimation, risk scoring, safe strategy, rollback, advisories, and a
//! confidence score for the simulation itself. Failures never escape this
//! boundary; every path returns a `SimulationOutcome`.

use crate::analysis::{
    analyze_impact, detect_antipatterns, estimate_locks, score_risk, ImpactReport, LockImpact,
    RiskScore, TextualReferenceMatcher,
};
use crate::config::{Environment, Settings};
use crate::error::{EngineError, EngineResult};
use crate::parser::split_statements;
use crate::pipeline::rollback::{generate_rollback, RollbackPlan};
use crate::pipeline::strategy::{generate_safe_strategy, SafeStrategyPlan};
use crate::simulation::{build_diff, MigrationDiff};
use crate::snapshot::model::SchemaSnapshot;
use crate::snapshot::{parse_snapshot, SchemaGraph};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

/// The engine's self-assessed reliability of this simulation, distinct from
/// the migration's own risk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScore {
    pub score: u32,
    pub level: ConfidenceLevel,
    pub explanation: Vec<String>,
}

/// Complete result of one simulation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeMigrationSimulation {
    pub id: Uuid,
    pub simulated_at: DateTime<Utc>,
    pub environment: Environment,
    pub snapshot_checksum: String,
    pub statements: Vec<String>,
    pub applied_statements: usize,
    pub diff: MigrationDiff,
    pub impact: ImpactReport,
    pub lock_impact: LockImpact,
    pub risk_score: RiskScore,
    pub safe_strategy: SafeStrategyPlan,
    pub rollback: RollbackPlan,
    pub advisories: Vec<String>,
    pub confidence: ConfidenceScore,
}

/// Outcome wrapper: `ok: false` carries errors and no simulation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SafeMigrationSimulation>,
    pub errors: Vec<String>,
}

impl SimulationOutcome {
    fn failure(message: String) -> Self {
        Self {
            ok: false,
            simulation: None,
            errors: vec![message],
        }
    }
}

/// Orchestrates the simulation pipeline
#[derive(Debug, Clone, Default)]
pub struct SafeMigrationEngine {
    settings: Settings,
}

impl SafeMigrationEngine {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Simulate a DDL script against a parsed snapshot
    pub fn simulate(
        &self,
        snapshot: &SchemaSnapshot,
        ddl: &str,
        environment: Environment,
    ) -> SimulationOutcome {
        match self.run(snapshot, ddl, environment) {
            Ok(simulation) => SimulationOutcome {
                ok: true,
                simulation: Some(simulation),
                errors: Vec::new(),
            },
            Err(err) => SimulationOutcome::failure(err.to_string()),
        }
    }

    /// Simulate against a raw JSON snapshot payload
    pub fn simulate_payload(
        &self,
        payload: Value,
        ddl: &str,
        environment: Environment,
    ) -> SimulationOutcome {
        match parse_snapshot(payload) {
            Ok(snapshot) => self.simulate(&snapshot, ddl, environment),
            Err(err) => SimulationOutcome::failure(err.to_string()),
        }
    }

    fn run(
        &self,
        snapshot: &SchemaSnapshot,
        ddl: &str,
        environment: Environment,
    ) -> EngineResult<SafeMigrationSimulation> {
        if ddl.trim().is_empty() {
            return Err(EngineError::EmptyScript);
        }
        if ddl.len() > self.settings.limits.max_script_bytes {
            return Err(EngineError::Simulation(format!(
                "script is {} bytes, limit is {}",
                ddl.len(),
                self.settings.limits.max_script_bytes
            )));
        }
        let statement_count = split_statements(ddl).len();
        if statement_count > self.settings.limits.max_statements {
            return Err(EngineError::ScriptTooLarge {
                statements: statement_count,
                limit: self.settings.limits.max_statements,
            });
        }

        let default_schema = self.settings.default_schema();
        info!(environment = %environment, "starting migration simulation");

        let simulated = build_diff(snapshot, ddl, default_schema)?;
        debug!(
            statements = simulated.statements.len(),
            applied = simulated.applied_statements,
            "diff built"
        );

        let graph = SchemaGraph::build(&simulated.before);
        let impact = analyze_impact(
            &simulated.diff,
            &simulated.before,
            &graph,
            &TextualReferenceMatcher,
        );
        let lock_impact = estimate_locks(&simulated.diff, &simulated.before, &simulated.statements);
        let risk_score = score_risk(
            &simulated.diff,
            &impact,
            &lock_impact,
            &simulated.before,
            environment,
            &self.settings.risk,
        );
        debug!(score = risk_score.score, level = %risk_score.level, "risk scored");

        let safe_strategy =
            generate_safe_strategy(&simulated.diff, risk_score.level, &simulated.statements);
        let rollback = generate_rollback(&simulated.diff);
        let advisories = detect_antipatterns(&simulated.statements);

        let confidence = compute_confidence(
            simulated.statements.len(),
            simulated.applied_statements,
            simulated.diff.is_empty(),
            lock_impact.rewrite_required,
            impact.fan_out(),
        );
        info!(
            risk = risk_score.score,
            confidence = confidence.score,
            "simulation complete"
        );

        Ok(SafeMigrationSimulation {
            id: Uuid::new_v4(),
            simulated_at: Utc::now(),
            environment,
            snapshot_checksum: snapshot.checksum.clone(),
            statements: simulated.statements,
            applied_statements: simulated.applied_statements,
            diff: simulated.diff,
            impact,
            lock_impact,
            risk_score,
            safe_strategy,
            rollback,
            advisories,
            confidence,
        })
    }
}

/// Confidence in the simulation itself: how much of the script the engine
/// understood and how noisy the result is
fn compute_confidence(
    statements: usize,
    applied: usize,
    empty_diff: bool,
    rewrite: bool,
    fan_out: usize,
) -> ConfidenceScore {
    let mut explanation = Vec::new();

    let ratio = if statements == 0 {
        0.0
    } else {
        applied as f64 / statements as f64
    };
    let mut score = 35 + (45.0 * ratio).round() as i64;
    explanation.push(format!(
        "applied {} of {} statements ({:.0}% coverage)",
        applied,
        statements,
        ratio * 100.0
    ));

    if statements <= 5 {
        score += 10;
        explanation.push("short script, easier to simulate faithfully".to_string());
    } else if statements >= 20 {
        score -= 8;
        explanation.push("long script, simulation drift more likely".to_string());
    }
    if empty_diff {
        score -= 20;
        explanation.push("no structural changes detected".to_string());
    }
    if rewrite {
        score -= 5;
        explanation.push("rewrite estimates depend on table statistics".to_string());
    }
    if fan_out >= 25 {
        score -= 5;
        explanation.push("large blast radius, indirect impact is approximate".to_string());
    }

    let score = score.clamp(5, 99) as u32;
    let level = if score < 55 {
        ConfidenceLevel::Low
    } else if score < 80 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::High
    };

    ConfidenceScore {
        score,
        level,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LockSeverity, RiskLevel};
    use crate::snapshot::model::{Column, SchemaDef, Table};
    use serde_json::json;

    fn orders_snapshot(rows: i64) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables: vec![Table {
                    name: "orders".to_string(),
                    columns: vec![
                        Column {
                            name: "id".to_string(),
                            data_type: "int".to_string(),
                            nullable: false,
                            default: None,
                        },
                        Column {
                            name: "total".to_string(),
                            data_type: "numeric".to_string(),
                            nullable: true,
                            default: None,
                        },
                    ],
                    row_count: Some(rows),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.compute_checksum();
        snapshot
    }

    fn engine() -> SafeMigrationEngine {
        SafeMigrationEngine::new(Settings::new())
    }

    #[test]
    fn test_empty_script_is_rejected() {
        let outcome = engine().simulate(&orders_snapshot(10), "   \n  ", Environment::Dev);
        assert!(!outcome.ok);
        assert!(outcome.simulation.is_none());
        assert!(!outcome.errors.is_empty());
    }

    #[test]
    fn test_comment_only_script_simulates_with_zero_applied() {
        let outcome = engine().simulate(
            &orders_snapshot(10),
            "-- nothing to do here\n/* really */",
            Environment::Dev,
        );
        assert!(outcome.ok);
        let sim = outcome.simulation.unwrap();
        assert_eq!(sim.applied_statements, 0);
        assert!(sim.diff.is_empty());
        assert_eq!(sim.confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_statement_cap_is_enforced() {
        let mut settings = Settings::new();
        settings.limits.max_statements = 3;
        let engine = SafeMigrationEngine::new(settings);
        let script = "SELECT 1; SELECT 2; SELECT 3; SELECT 4;";
        let outcome = engine.simulate(&orders_snapshot(10), script, Environment::Dev);
        assert!(!outcome.ok);
        assert!(outcome.errors[0].contains("too large"));
    }

    #[test]
    fn test_end_to_end_defaulted_not_null_add_in_prod() {
        let outcome = engine().simulate(
            &orders_snapshot(2_000_000),
            "ALTER TABLE public.orders ADD COLUMN status text NOT NULL DEFAULT 'pending';",
            Environment::Prod,
        );
        assert!(outcome.ok);
        let sim = outcome.simulation.unwrap();

        assert!(sim.lock_impact.rewrite_required);
        assert_eq!(sim.lock_impact.estimated_lock_severity, LockSeverity::High);
        assert!(matches!(
            sim.risk_score.level,
            RiskLevel::High | RiskLevel::Critical
        ));
        assert!(sim.safe_strategy.recommended);
        let titles: Vec<&str> = sim
            .safe_strategy
            .phases
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert!(titles.iter().any(|t| t.starts_with("Expand")));
        assert!(titles.iter().any(|t| t.starts_with("Backfill")));
        assert!(titles.iter().any(|t| t.starts_with("Contract")));
        assert!(sim
            .rollback
            .statements
            .iter()
            .any(|s| s.contains("DROP COLUMN IF EXISTS status")));
        assert!(sim.advisories.iter().any(|a| a.contains("backfill")));
        assert_eq!(sim.snapshot_checksum, orders_snapshot(2_000_000).checksum);
    }

    #[test]
    fn test_simulate_payload_parses_snapshot() {
        let payload = json!({
            "schemas": [{
                "name": "public",
                "tables": [{"name": "users", "columns": [
                    {"name": "id", "dataType": "int", "nullable": false}
                ]}]
            }]
        });
        let outcome = engine().simulate_payload(
            payload,
            "ALTER TABLE users ADD COLUMN email text;",
            Environment::Staging,
        );
        assert!(outcome.ok);
        let sim = outcome.simulation.unwrap();
        assert_eq!(sim.applied_statements, 1);
        assert_eq!(sim.diff.columns_added.len(), 1);
    }

    #[test]
    fn test_bad_payload_fails_closed() {
        let outcome =
            engine().simulate_payload(json!({"schemas": []}), "SELECT 1;", Environment::Dev);
        assert!(!outcome.ok);
        assert!(outcome.errors[0].contains("snapshot"));
    }

    #[test]
    fn test_confidence_scoring_bounds() {
        let full = compute_confidence(2, 2, false, false, 0);
        assert_eq!(full.score, 90);
        assert_eq!(full.level, ConfidenceLevel::High);

        let none = compute_confidence(0, 0, true, false, 0);
        assert_eq!(none.score, 25);
        assert_eq!(none.level, ConfidenceLevel::Low);

        let noisy = compute_confidence(30, 10, false, true, 30);
        // 35 + 15 - 8 - 5 - 5
        assert_eq!(noisy.score, 32);
    }
}
