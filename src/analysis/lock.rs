//! Lock estimation
//!
//! Maps each diff entry onto a Postgres-like lock signal, then aggregates to
//! one `LockImpact` per simulation: the most severe lock type by rank, the
//! maximum severity, the OR of rewrite flags, and the summed row estimate.
//! `CONCURRENTLY` cannot be seen in the diff, so index entries fall back to
//! scanning the raw statement text.

use crate::simulation::{ChangeKind, ConstraintSource, MigrationDiff};
use crate::snapshot::model::{ConstraintKind, SchemaSnapshot, TableRef};
use serde::Serialize;

/// Lock types the estimator distinguishes, ordered by disruptiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SHARE UPDATE EXCLUSIVE")]
    ShareUpdateExclusive,
    #[serde(rename = "SHARE ROW EXCLUSIVE")]
    ShareRowExclusive,
    #[serde(rename = "SHARE")]
    Share,
    #[serde(rename = "EXCLUSIVE")]
    Exclusive,
    #[serde(rename = "ACCESS EXCLUSIVE")]
    AccessExclusive,
}

impl LockType {
    fn rank(self) -> u8 {
        match self {
            LockType::None => 0,
            LockType::ShareUpdateExclusive => 1,
            LockType::ShareRowExclusive => 2,
            LockType::Share => 3,
            LockType::Exclusive => 4,
            LockType::AccessExclusive => 5,
        }
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockType::None => "NONE",
            LockType::ShareUpdateExclusive => "SHARE UPDATE EXCLUSIVE",
            LockType::ShareRowExclusive => "SHARE ROW EXCLUSIVE",
            LockType::Share => "SHARE",
            LockType::Exclusive => "EXCLUSIVE",
            LockType::AccessExclusive => "ACCESS EXCLUSIVE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LockSeverity {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

/// Aggregated lock estimate for one simulation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockImpact {
    pub lock_type: LockType,
    pub rewrite_required: bool,
    pub estimated_rows_touched: i64,
    pub estimated_lock_severity: LockSeverity,
}

impl Default for LockImpact {
    fn default() -> Self {
        Self {
            lock_type: LockType::None,
            rewrite_required: false,
            estimated_rows_touched: 0,
            estimated_lock_severity: LockSeverity::Low,
        }
    }
}

struct LockSignal {
    lock_type: LockType,
    severity: LockSeverity,
    rewrite: bool,
    rows: i64,
}

fn table_rows(snapshot: &SchemaSnapshot, table: &TableRef) -> i64 {
    snapshot
        .table(&table.schema, &table.name)
        .map(|t| t.rows())
        .unwrap_or(0)
}

/// Does any raw statement run this object's DDL with CONCURRENTLY?
fn is_concurrent(statements: &[String], object: &str) -> bool {
    let object = object.to_lowercase();
    statements.iter().any(|s| {
        let s = s.to_lowercase();
        s.contains("concurrently") && s.contains(&object)
    })
}

/// Estimate the aggregate lock impact of a diff
pub fn estimate_locks(
    diff: &MigrationDiff,
    before: &SchemaSnapshot,
    statements: &[String],
) -> LockImpact {
    let mut signals: Vec<LockSignal> = Vec::new();

    for _ in &diff.tables_added {
        signals.push(LockSignal {
            lock_type: LockType::None,
            severity: LockSeverity::Low,
            rewrite: false,
            rows: 0,
        });
    }
    for table in &diff.tables_removed {
        signals.push(LockSignal {
            lock_type: LockType::AccessExclusive,
            severity: LockSeverity::High,
            rewrite: false,
            rows: table_rows(before, table),
        });
    }

    for delta in &diff.columns_added {
        let col = &delta.column;
        let signal = if col.default.is_some() && !col.nullable {
            // Full table rewrite to materialize the default
            LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::High,
                rewrite: true,
                rows: table_rows(before, &delta.table),
            }
        } else if col.default.is_some() || !col.nullable {
            LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Medium,
                rewrite: false,
                rows: 0,
            }
        } else {
            LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Low,
                rewrite: false,
                rows: 0,
            }
        };
        signals.push(signal);
    }

    for _ in &diff.columns_removed {
        // Metadata-only in Postgres, the lock is held briefly
        signals.push(LockSignal {
            lock_type: LockType::AccessExclusive,
            severity: LockSeverity::Low,
            rewrite: false,
            rows: 0,
        });
    }

    for delta in &diff.columns_altered {
        if delta.before.data_type != delta.after.data_type {
            signals.push(LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::High,
                rewrite: true,
                rows: table_rows(before, &delta.table),
            });
        } else if delta.before.nullable != delta.after.nullable {
            // SET NOT NULL scans the whole table to validate
            let rows = if delta.before.nullable && !delta.after.nullable {
                table_rows(before, &delta.table)
            } else {
                0
            };
            signals.push(LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Medium,
                rewrite: false,
                rows,
            });
        } else {
            // Default-only change
            signals.push(LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Medium,
                rewrite: false,
                rows: 0,
            });
        }
    }

    for delta in &diff.indexes_added {
        let concurrent = is_concurrent(statements, &delta.index.name)
            || is_concurrent(statements, &delta.table.name);
        signals.push(LockSignal {
            lock_type: if concurrent {
                LockType::ShareUpdateExclusive
            } else {
                LockType::AccessExclusive
            },
            severity: if concurrent {
                LockSeverity::Low
            } else {
                LockSeverity::Medium
            },
            rewrite: false,
            rows: table_rows(before, &delta.table),
        });
    }
    for delta in &diff.indexes_removed {
        let concurrent = is_concurrent(statements, &delta.index.name);
        signals.push(LockSignal {
            lock_type: if concurrent {
                LockType::ShareUpdateExclusive
            } else {
                LockType::AccessExclusive
            },
            severity: if concurrent {
                LockSeverity::Low
            } else {
                LockSeverity::Medium
            },
            rewrite: false,
            rows: 0,
        });
    }

    for delta in &diff.constraint_changes {
        let signal = match (delta.source, delta.kind) {
            (ConstraintSource::ForeignKey, ChangeKind::Added | ChangeKind::Changed) => LockSignal {
                lock_type: LockType::ShareRowExclusive,
                severity: LockSeverity::Medium,
                rewrite: false,
                rows: table_rows(before, &delta.table),
            },
            (ConstraintSource::ForeignKey, ChangeKind::Removed) => LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Medium,
                rewrite: false,
                rows: 0,
            },
            (ConstraintSource::Constraint, ChangeKind::Added | ChangeKind::Changed) => {
                let kind = delta.after.as_ref().map(|c| c.kind);
                match kind {
                    Some(ConstraintKind::PrimaryKey) | Some(ConstraintKind::Unique) => LockSignal {
                        lock_type: LockType::AccessExclusive,
                        severity: LockSeverity::High,
                        rewrite: false,
                        rows: table_rows(before, &delta.table),
                    },
                    _ => LockSignal {
                        lock_type: LockType::AccessExclusive,
                        severity: LockSeverity::Medium,
                        rewrite: false,
                        rows: table_rows(before, &delta.table),
                    },
                }
            }
            (ConstraintSource::Constraint, ChangeKind::Removed) => LockSignal {
                lock_type: LockType::AccessExclusive,
                severity: LockSeverity::Low,
                rewrite: false,
                rows: 0,
            },
        };
        signals.push(signal);
    }

    let mut impact = LockImpact::default();
    for signal in signals {
        if signal.lock_type.rank() > impact.lock_type.rank() {
            impact.lock_type = signal.lock_type;
        }
        if signal.severity > impact.estimated_lock_severity {
            impact.estimated_lock_severity = signal.severity;
        }
        impact.rewrite_required |= signal.rewrite;
        impact.estimated_rows_touched += signal.rows.max(0);
    }
    impact.estimated_rows_touched = impact.estimated_rows_touched.max(0);

    // Escalation floors keyed on row volume
    if impact.estimated_rows_touched >= 1_000_000
        && impact.estimated_lock_severity < LockSeverity::Medium
    {
        impact.estimated_lock_severity = LockSeverity::Medium;
    }
    if impact.rewrite_required
        && impact.estimated_rows_touched >= 100_000
        && impact.estimated_lock_severity < LockSeverity::High
    {
        impact.estimated_lock_severity = LockSeverity::High;
    }

    impact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::build_diff;
    use crate::snapshot::model::{Column, SchemaDef, Table};

    fn snapshot(rows: i64) -> SchemaSnapshot {
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
                    row_count: Some(rows),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn estimate(rows: i64, script: &str) -> LockImpact {
        let snap = snapshot(rows);
        let result = build_diff(&snap, script, "public").unwrap();
        estimate_locks(&result.diff, &snap, &result.statements)
    }

    #[test]
    fn test_nullable_add_is_low() {
        let impact = estimate(500, "ALTER TABLE orders ADD COLUMN note text;");
        assert_eq!(impact.estimated_lock_severity, LockSeverity::Low);
        assert!(!impact.rewrite_required);
        assert_eq!(impact.estimated_rows_touched, 0);
    }

    #[test]
    fn test_defaulted_not_null_add_is_rewrite() {
        let impact = estimate(
            2_000_000,
            "ALTER TABLE orders ADD COLUMN status text NOT NULL DEFAULT 'pending';",
        );
        assert!(impact.rewrite_required);
        assert_eq!(impact.estimated_lock_severity, LockSeverity::High);
        assert_eq!(impact.lock_type, LockType::AccessExclusive);
        assert_eq!(impact.estimated_rows_touched, 2_000_000);
    }

    #[test]
    fn test_type_change_is_rewrite() {
        let impact = estimate(50, "ALTER TABLE orders ALTER COLUMN total TYPE bigint;");
        assert!(impact.rewrite_required);
        assert_eq!(impact.estimated_lock_severity, LockSeverity::High);
    }

    #[test]
    fn test_concurrent_index_is_low() {
        let concurrent = estimate(10_000, "CREATE INDEX CONCURRENTLY ON orders (total);");
        assert_eq!(concurrent.lock_type, LockType::ShareUpdateExclusive);
        assert_eq!(concurrent.estimated_lock_severity, LockSeverity::Low);

        let blocking = estimate(10_000, "CREATE INDEX ON orders (total);");
        assert_eq!(blocking.lock_type, LockType::AccessExclusive);
        assert_eq!(blocking.estimated_lock_severity, LockSeverity::Medium);
    }

    #[test]
    fn test_row_volume_floors_severity() {
        // An index build alone is MEDIUM; a million-row build stays at least
        // MEDIUM and a concurrent one gets floored up from LOW
        let impact = estimate(1_500_000, "CREATE INDEX CONCURRENTLY ON orders (total);");
        assert_eq!(impact.estimated_lock_severity, LockSeverity::Medium);
    }

    #[test]
    fn test_fk_addition_is_share_row_exclusive() {
        let snap = snapshot(100);
        let script = "CREATE TABLE users (id int); \
                      ALTER TABLE orders ADD CONSTRAINT orders_user_fk FOREIGN KEY (id) REFERENCES users (id);";
        let result = build_diff(&snap, script, "public").unwrap();
        let impact = estimate_locks(&result.diff, &snap, &result.statements);
        assert_eq!(impact.lock_type, LockType::ShareRowExclusive);
        assert_eq!(impact.estimated_lock_severity, LockSeverity::Medium);
    }

    #[test]
    fn test_drop_table_is_high() {
        let impact = estimate(42, "DROP TABLE orders;");
        assert_eq!(impact.lock_type, LockType::AccessExclusive);
        assert_eq!(impact.estimated_lock_severity, LockSeverity::High);
        assert_eq!(impact.estimated_rows_touched, 42);
    }
}
