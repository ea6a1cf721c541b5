//! Risk scoring
//!
//! Combines dependency impact, lock severity, rewrite cost, table footprint
//! and target environment into a 0-100 score with a discrete level. The
//! override constants are hand-tuned and live in `RiskTuning` so deployments
//! can adjust them without touching the scorer.

use crate::analysis::impact::ImpactReport;
use crate::analysis::lock::{LockImpact, LockSeverity};
use crate::config::{Environment, RiskTuning};
use crate::simulation::{ChangeKind, MigrationDiff};
use crate::snapshot::model::SchemaSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub score: u32,
    pub level: RiskLevel,
    pub explanation: Vec<String>,
}

/// Footprint tiers: row-count or size thresholds, whichever trips first
const FOOTPRINT_TIERS: [(i64, i64); 3] = [
    (100_000, 512 * 1024 * 1024),
    (1_000_000, 2 * 1024 * 1024 * 1024),
    (10_000_000, 10 * 1024 * 1024 * 1024),
];
const FOOTPRINT_SCORES: [u32; 4] = [2, 4, 7, 10];

/// Tier index (0-3) for the largest touched table, None when the diff
/// touches no known table
fn footprint_tier(diff: &MigrationDiff, before: &SchemaSnapshot) -> Option<usize> {
    let mut largest_rows = 0i64;
    let mut largest_bytes = 0i64;
    let mut seen = false;
    for table_ref in diff.touched_tables() {
        if let Some(table) = before.table(&table_ref.schema, &table_ref.name) {
            seen = true;
            largest_rows = largest_rows.max(table.rows());
            largest_bytes = largest_bytes.max(table.size_bytes.unwrap_or(0));
        }
    }
    if !seen {
        return None;
    }
    let mut tier = 0;
    for (i, (rows, bytes)) in FOOTPRINT_TIERS.iter().enumerate() {
        if largest_rows >= *rows || largest_bytes >= *bytes {
            tier = i + 1;
        }
    }
    Some(tier)
}

fn lock_score(severity: LockSeverity) -> u32 {
    match severity {
        LockSeverity::Low => 5,
        LockSeverity::Medium => 15,
        LockSeverity::High => 30,
    }
}

/// A change is metadata-only when it needs no table rewrite and touches
/// nothing destructive: no tables added or removed, no columns removed, any
/// added columns nullable without a default, no type changes, and constraint
/// changes limited to additions.
fn is_metadata_only(diff: &MigrationDiff, lock: &LockImpact) -> bool {
    !lock.rewrite_required
        && diff.tables_added.is_empty()
        && diff.tables_removed.is_empty()
        && diff.columns_removed.is_empty()
        && diff
            .columns_added
            .iter()
            .all(|d| d.column.nullable && d.column.default.is_none())
        && diff
            .columns_altered
            .iter()
            .all(|d| d.before.data_type == d.after.data_type)
        && diff
            .constraint_changes
            .iter()
            .all(|d| d.kind == ChangeKind::Added)
}

/// The dependency signal is "high" when the blast radius alone makes the
/// migration dangerous
fn is_high_dependency(broken: usize, direct: usize) -> bool {
    broken >= 3 || direct >= 8 || (broken >= 2 && direct >= 4)
}

/// Score a migration's risk from its analysis signals
pub fn score_risk(
    diff: &MigrationDiff,
    impact: &ImpactReport,
    lock: &LockImpact,
    before: &SchemaSnapshot,
    environment: Environment,
    tuning: &RiskTuning,
) -> RiskScore {
    let mut explanation = Vec::new();

    let broken = impact.broken_objects.len();
    let direct = impact.direct_impact.len();
    let indirect = impact.indirect_impact.len();
    let dependency_signal = (broken as u32 * tuning.broken_weight
        + direct as u32 * tuning.direct_weight
        + indirect as u32 * tuning.indirect_weight)
        .min(tuning.dependency_cap);
    if dependency_signal > 0 {
        explanation.push(format!(
            "dependency impact contributes {} ({} broken, {} direct, {} indirect)",
            dependency_signal, broken, direct, indirect
        ));
    }

    let lock_points = lock_score(lock.estimated_lock_severity);
    explanation.push(format!(
        "lock severity {:?} contributes {}",
        lock.estimated_lock_severity, lock_points
    ));

    let rewrite_points = if lock.rewrite_required {
        explanation.push(format!(
            "table rewrite required, contributes {}",
            tuning.rewrite_score
        ));
        tuning.rewrite_score
    } else {
        0
    };

    let tier = footprint_tier(diff, before);
    let footprint_points = tier.map(|t| FOOTPRINT_SCORES[t]).unwrap_or(0);
    if let Some(t) = tier {
        explanation.push(format!(
            "largest touched table in footprint tier {} contributes {}",
            t, footprint_points
        ));
    }

    let env_points = environment.risk_weight();
    if env_points > 0 {
        explanation.push(format!(
            "target environment {} contributes {}",
            environment, env_points
        ));
    }

    let mut score =
        dependency_signal + lock_points + rewrite_points + footprint_points + env_points;

    if is_metadata_only(diff, lock) {
        if score > tuning.metadata_only_cap {
            score = tuning.metadata_only_cap;
            explanation.push(format!(
                "metadata-only change, score capped at {}",
                tuning.metadata_only_cap
            ));
        }
    } else {
        let high_dependency = is_high_dependency(broken, direct);
        if high_dependency && lock.rewrite_required {
            let floor = if environment == Environment::Prod {
                tuning.dangerous_floor_prod
            } else {
                tuning.dangerous_floor
            };
            if score < floor {
                score = floor;
                explanation.push(format!(
                    "high dependency impact with rewrite, score floored at {}",
                    floor
                ));
            }
            let big_footprint = tier.map(|t| t >= 3).unwrap_or(false);
            if lock.estimated_lock_severity == LockSeverity::High
                && (environment == Environment::Prod || big_footprint)
                && score < tuning.critical_floor
            {
                score = tuning.critical_floor;
                explanation.push(format!(
                    "high lock severity in a critical context, score floored at {}",
                    tuning.critical_floor
                ));
            }
        }
    }

    let score = score.min(100);
    let level = if score < tuning.medium_threshold {
        RiskLevel::Low
    } else if score < tuning.high_threshold {
        RiskLevel::Medium
    } else if score < tuning.critical_threshold {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    };

    RiskScore {
        score,
        level,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::impact::{analyze_impact, TextualReferenceMatcher};
    use crate::analysis::lock::estimate_locks;
    use crate::simulation::build_diff;
    use crate::snapshot::model::{Column, ForeignKey, SchemaDef, Table};
    use crate::snapshot::SchemaGraph;

    fn orders_snapshot(rows: i64, dependents: usize) -> SchemaSnapshot {
        let mut tables = vec![Table {
            name: "orders".to_string(),
            columns: vec![
                Column {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
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
        }];
        for i in 0..dependents {
            tables.push(Table {
                name: format!("child_{}", i),
                columns: vec![Column {
                    name: "order_id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: true,
                    default: None,
                }],
                foreign_keys: vec![ForeignKey {
                    name: format!("child_{}_order_fk", i),
                    columns: vec!["order_id".to_string()],
                    referenced_schema: "public".to_string(),
                    referenced_table: "orders".to_string(),
                    referenced_columns: vec!["id".to_string()],
                    ..Default::default()
                }],
                ..Default::default()
            });
        }
        SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables,
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn score(snapshot: &SchemaSnapshot, script: &str, env: Environment) -> RiskScore {
        let result = build_diff(snapshot, script, "public").unwrap();
        let graph = SchemaGraph::build(snapshot);
        let impact = analyze_impact(&result.diff, snapshot, &graph, &TextualReferenceMatcher);
        let lock = estimate_locks(&result.diff, snapshot, &result.statements);
        score_risk(
            &result.diff,
            &impact,
            &lock,
            snapshot,
            env,
            &RiskTuning::default(),
        )
    }

    #[test]
    fn test_metadata_only_capped_low_even_in_prod() {
        let snap = orders_snapshot(5_000_000, 0);
        let risk = score(&snap, "ALTER TABLE orders ADD COLUMN note text;", Environment::Prod);
        assert!(risk.score <= 24, "score was {}", risk.score);
        assert_eq!(risk.level, RiskLevel::Low);
    }

    #[test]
    fn test_type_change_with_many_dependents_floors_high() {
        let snap = orders_snapshot(500_000, 9);
        let risk = score(
            &snap,
            "ALTER TABLE orders ALTER COLUMN id TYPE bigint;",
            Environment::Prod,
        );
        assert!(risk.score >= 75, "score was {}", risk.score);
        assert!(matches!(risk.level, RiskLevel::High | RiskLevel::Critical));
    }

    #[test]
    fn test_critical_floor_in_prod_with_high_lock() {
        let snap = orders_snapshot(20_000_000, 9);
        let risk = score(
            &snap,
            "ALTER TABLE orders ALTER COLUMN id TYPE bigint;",
            Environment::Prod,
        );
        assert!(risk.score >= 90, "score was {}", risk.score);
        assert_eq!(risk.level, RiskLevel::Critical);
    }

    #[test]
    fn test_environment_raises_score() {
        let snap = orders_snapshot(10, 0);
        let script = "DROP TABLE orders;";
        let dev = score(&snap, script, Environment::Dev);
        let prod = score(&snap, script, Environment::Prod);
        assert!(prod.score > dev.score);
    }

    #[test]
    fn test_explanation_names_every_signal() {
        let snap = orders_snapshot(2_000_000, 2);
        let risk = score(
            &snap,
            "ALTER TABLE orders ADD COLUMN status text NOT NULL DEFAULT 'pending';",
            Environment::Prod,
        );
        let text = risk.explanation.join("\n");
        assert!(text.contains("lock severity"));
        assert!(text.contains("rewrite"));
        assert!(text.contains("environment"));
    }
}
