//! Safe strategy generation
//!
//! Rewrites a risky migration into ordered phases of lower-lock-severity
//! steps. Only activates for HIGH/CRITICAL risk. Phases are appended in
//! category order (constraints, indexes, columns, tables); entries belonging
//! to tables created by the same migration are skipped.

use crate::analysis::RiskLevel;
use crate::simulation::{ChangeKind, ConstraintSource, MigrationDiff};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPhase {
    pub title: String,
    pub sql: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeStrategyPlan {
    pub recommended: bool,
    pub explanation: String,
    pub phases: Vec<StrategyPhase>,
    /// Flattened phase statements with title comments, ready to execute
    pub sql: Vec<String>,
}

impl SafeStrategyPlan {
    fn not_recommended(explanation: impl Into<String>) -> Self {
        Self {
            recommended: false,
            explanation: explanation.into(),
            phases: Vec::new(),
            sql: Vec::new(),
        }
    }
}

/// Generate a phased rewrite for HIGH/CRITICAL migrations
pub fn generate_safe_strategy(
    diff: &MigrationDiff,
    level: RiskLevel,
    statements: &[String],
) -> SafeStrategyPlan {
    if level < RiskLevel::High {
        return SafeStrategyPlan::not_recommended(format!(
            "risk level {} does not require a phased strategy",
            level
        ));
    }

    let new_tables: BTreeSet<String> = diff.tables_added.iter().map(|t| t.to_string()).collect();
    let mut phases: Vec<StrategyPhase> = Vec::new();

    // Constraints first: a NOT VALID add plus a separate validation pass
    for delta in &diff.constraint_changes {
        if delta.kind != ChangeKind::Added || new_tables.contains(&delta.table.to_string()) {
            continue;
        }
        if delta.source == ConstraintSource::ForeignKey {
            if let Some(fk) = &delta.after_fk {
                let mut add = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}.{}",
                    delta.table,
                    fk.name,
                    fk.columns.join(", "),
                    fk.referenced_schema,
                    fk.referenced_table
                );
                if !fk.referenced_columns.is_empty() {
                    add.push_str(&format!(" ({})", fk.referenced_columns.join(", ")));
                }
                add.push_str(" NOT VALID;");
                phases.push(StrategyPhase {
                    title: format!("Add foreign key {} without validation", fk.name),
                    sql: vec![add],
                });
                phases.push(StrategyPhase {
                    title: format!("Validate foreign key {}", fk.name),
                    sql: vec![format!(
                        "ALTER TABLE {} VALIDATE CONSTRAINT {};",
                        delta.table, fk.name
                    )],
                });
            }
        }
    }

    // Index builds move online
    for delta in &diff.indexes_added {
        if new_tables.contains(&delta.table.to_string()) {
            continue;
        }
        let idx = &delta.index;
        let mut sql = String::from("CREATE ");
        if idx.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str(&format!(
            "INDEX CONCURRENTLY IF NOT EXISTS {} ON {}",
            idx.name, delta.table
        ));
        if let Some(method) = &idx.method {
            sql.push_str(&format!(" USING {}", method));
        }
        sql.push_str(&format!(" ({})", idx.columns.join(", ")));
        if let Some(predicate) = &idx.predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        sql.push(';');
        phases.push(StrategyPhase {
            title: format!("Build index {} online", idx.name),
            sql: vec![sql],
        });
    }

    // Column additions carrying a default or NOT NULL: expand, backfill,
    // contract
    for delta in &diff.columns_added {
        if new_tables.contains(&delta.table.to_string()) {
            continue;
        }
        let col = &delta.column;
        if col.default.is_none() && col.nullable {
            continue;
        }
        phases.push(StrategyPhase {
            title: format!("Expand: add nullable {}.{}", delta.table, col.name),
            sql: vec![format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                delta.table, col.name, col.data_type
            )],
        });
        let backfill = match &col.default {
            Some(default) => format!(
                "UPDATE {} SET {} = {} WHERE {} IS NULL;",
                delta.table, col.name, default, col.name
            ),
            None => format!(
                "-- TODO: backfill {}.{} before enforcing NOT NULL",
                delta.table, col.name
            ),
        };
        phases.push(StrategyPhase {
            title: format!("Backfill {}.{} in batches", delta.table, col.name),
            sql: vec![backfill],
        });
        let mut contract = Vec::new();
        if let Some(default) = &col.default {
            contract.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                delta.table, col.name, default
            ));
        }
        if !col.nullable {
            contract.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                delta.table, col.name
            ));
        }
        phases.push(StrategyPhase {
            title: format!("Contract: enforce constraints on {}.{}", delta.table, col.name),
            sql: contract,
        });
    }

    // Type changes: shadow column, backfill, cutover
    for delta in &diff.columns_altered {
        if new_tables.contains(&delta.table.to_string()) {
            continue;
        }
        if delta.before.data_type == delta.after.data_type {
            continue;
        }
        let col = &delta.after;
        let shadow = format!("{}__new", col.name);
        phases.push(StrategyPhase {
            title: format!("Add shadow column {}.{}", delta.table, shadow),
            sql: vec![format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                delta.table, shadow, col.data_type
            )],
        });
        phases.push(StrategyPhase {
            title: format!("Backfill {}.{} from {}", delta.table, shadow, col.name),
            sql: vec![format!(
                "UPDATE {} SET {} = {}::{};",
                delta.table, shadow, col.name, col.data_type
            )],
        });
        let mut cutover = Vec::new();
        if let Some(default) = &col.default {
            cutover.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                delta.table, shadow, default
            ));
        }
        if !col.nullable {
            cutover.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                delta.table, shadow
            ));
        }
        cutover.push(format!(
            "ALTER TABLE {} DROP COLUMN {};",
            delta.table, col.name
        ));
        cutover.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            delta.table, shadow, col.name
        ));
        phases.push(StrategyPhase {
            title: format!("Cut over {}.{} to the new type", delta.table, col.name),
            sql: cutover,
        });
    }

    // Column removals: deprecate first, drop later
    for delta in &diff.columns_removed {
        if diff.tables_removed.contains(&delta.table) {
            continue;
        }
        let col = &delta.column.name;
        phases.push(StrategyPhase {
            title: format!("Deprecate {}.{} before dropping", delta.table, col),
            sql: vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}__deprecated;",
                delta.table, col, col
            )],
        });
        phases.push(StrategyPhase {
            title: format!("Drop {}.{} once confirmed unused", delta.table, col),
            sql: vec![format!(
                "-- ALTER TABLE {} DROP COLUMN {}__deprecated; -- run after confirming nothing reads it",
                delta.table, col
            )],
        });
    }

    // Table removals: park the table under a tombstone name
    for table in &diff.tables_removed {
        phases.push(StrategyPhase {
            title: format!("Deprecate table {} before dropping", table),
            sql: vec![format!(
                "ALTER TABLE {} RENAME TO {}__to_delete;",
                table, table.name
            )],
        });
        phases.push(StrategyPhase {
            title: format!("Drop table {} once confirmed unused", table),
            sql: vec![format!(
                "-- DROP TABLE {}.{}__to_delete; -- run after a retention window",
                table.schema, table.name
            )],
        });
    }

    if phases.is_empty() {
        // No rewrite pattern matched; stage the original statements manually
        let mut sql = Vec::new();
        for (i, statement) in statements.iter().enumerate() {
            sql.push(format!("-- step {}", i + 1));
            sql.push(format!("{};", statement.trim_end_matches(';')));
        }
        phases.push(StrategyPhase {
            title: "Execute original statements one at a time, verifying between steps"
                .to_string(),
            sql,
        });
    }

    let mut flattened = Vec::new();
    for (i, phase) in phases.iter().enumerate() {
        if i > 0 {
            flattened.push(String::new());
        }
        flattened.push(format!("-- {}", phase.title));
        flattened.extend(phase.sql.iter().cloned());
    }

    SafeStrategyPlan {
        recommended: true,
        explanation: format!(
            "risk level {} warrants a phased execution in {} steps",
            level,
            phases.len()
        ),
        phases,
        sql: flattened,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::build_diff;
    use crate::snapshot::model::{Column, SchemaDef, SchemaSnapshot, Table};

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables: vec![Table {
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
                    row_count: Some(2_000_000),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn plan_for(script: &str, level: RiskLevel) -> SafeStrategyPlan {
        let snap = snapshot();
        let result = build_diff(&snap, script, "public").unwrap();
        generate_safe_strategy(&result.diff, level, &result.statements)
    }

    #[test]
    fn test_gated_below_high() {
        let plan = plan_for("ALTER TABLE orders ADD COLUMN note text;", RiskLevel::Medium);
        assert!(!plan.recommended);
        assert!(plan.phases.is_empty());
        assert!(plan.sql.is_empty());
    }

    #[test]
    fn test_defaulted_add_becomes_expand_backfill_contract() {
        let plan = plan_for(
            "ALTER TABLE orders ADD COLUMN status text NOT NULL DEFAULT 'pending';",
            RiskLevel::High,
        );
        assert!(plan.recommended);
        let titles: Vec<&str> = plan.phases.iter().map(|p| p.title.as_str()).collect();
        assert!(titles[0].starts_with("Expand"));
        assert!(titles[1].starts_with("Backfill"));
        assert!(titles[2].starts_with("Contract"));
        assert!(plan.phases[1].sql[0].contains("WHERE status IS NULL"));
        assert!(plan.phases[2].sql.iter().any(|s| s.contains("SET NOT NULL")));
    }

    #[test]
    fn test_type_change_uses_shadow_column() {
        let plan = plan_for(
            "ALTER TABLE orders ALTER COLUMN total TYPE bigint;",
            RiskLevel::High,
        );
        let all_sql = plan.sql.join("\n");
        assert!(all_sql.contains("total__new"));
        assert!(all_sql.contains("RENAME COLUMN total__new TO total"));
    }

    #[test]
    fn test_index_build_moves_online() {
        let plan = plan_for("CREATE INDEX orders_total_idx ON orders (total);", RiskLevel::High);
        assert!(plan.phases[0].sql[0].contains("CONCURRENTLY"));
    }

    #[test]
    fn test_table_removal_gets_tombstone() {
        let plan = plan_for("DROP TABLE orders;", RiskLevel::Critical);
        let all_sql = plan.sql.join("\n");
        assert!(all_sql.contains("RENAME TO orders__to_delete"));
        assert!(all_sql.contains("-- DROP TABLE public.orders__to_delete"));
    }

    #[test]
    fn test_new_tables_are_excluded() {
        let plan = plan_for(
            "CREATE TABLE shipments (id int PRIMARY KEY, note text NOT NULL DEFAULT '');",
            RiskLevel::High,
        );
        // Nothing to phase on a brand-new table; falls back to staged manual
        // execution
        assert_eq!(plan.phases.len(), 1);
        assert!(plan.phases[0].sql[0].starts_with("-- step 1"));
    }
}
