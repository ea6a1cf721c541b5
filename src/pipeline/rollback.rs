//! Rollback generation
//!
//! Derives inverse SQL for the raw diff in dependency-safe order. Lossy
//! steps emit warnings instead of pretending data can come back, and
//! constraints whose prior definition cannot be reconstructed are skipped
//! with a warning rather than guessed at.

use crate::simulation::{normalize_ws, ChangeKind, ConstraintSource, MigrationDiff};
use crate::snapshot::model::{Constraint, ConstraintKind, ForeignKey, TableRef};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPlan {
    pub statements: Vec<String>,
    pub warnings: Vec<String>,
}

struct Builder {
    statements: Vec<String>,
    warnings: Vec<String>,
    seen: BTreeSet<String>,
}

impl Builder {
    fn push(&mut self, sql: String) {
        // Dedup by normalized whitespace so equivalent statements collapse
        if self.seen.insert(normalize_ws(&sql)) {
            self.statements.push(sql);
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

fn constraint_sql(table: &TableRef, constraint: &Constraint) -> Option<String> {
    match constraint.kind {
        ConstraintKind::PrimaryKey => Some(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
            table,
            constraint.name,
            constraint.columns.join(", ")
        )),
        ConstraintKind::Unique => Some(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
            table,
            constraint.name,
            constraint.columns.join(", ")
        )),
        ConstraintKind::Check => constraint.definition.as_ref().map(|def| {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
                table, constraint.name, def
            )
        }),
        // FK constraints travel through the foreign_keys list, not here
        ConstraintKind::ForeignKey => None,
    }
}

fn foreign_key_sql(table: &TableRef, fk: &ForeignKey) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}.{}",
        table,
        fk.name,
        fk.columns.join(", "),
        fk.referenced_schema,
        fk.referenced_table
    );
    if !fk.referenced_columns.is_empty() {
        sql.push_str(&format!(" ({})", fk.referenced_columns.join(", ")));
    }
    if let Some(action) = &fk.on_update {
        sql.push_str(&format!(" ON UPDATE {}", action));
    }
    if let Some(action) = &fk.on_delete {
        sql.push_str(&format!(" ON DELETE {}", action));
    }
    sql.push(';');
    sql
}

/// Generate the inverse plan for a diff
pub fn generate_rollback(diff: &MigrationDiff) -> RollbackPlan {
    let mut b = Builder {
        statements: Vec::new(),
        warnings: Vec::new(),
        seen: BTreeSet::new(),
    };

    let added: BTreeSet<&TableRef> = diff.tables_added.iter().collect();
    let removed: BTreeSet<&TableRef> = diff.tables_removed.iter().collect();
    let churned = |t: &TableRef| added.contains(t) || removed.contains(t);

    // 1. Drop constraints the migration added
    for delta in &diff.constraint_changes {
        if delta.kind != ChangeKind::Added || churned(&delta.table) {
            continue;
        }
        b.push(format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            delta.table, delta.name
        ));
    }

    // 2. Drop indexes the migration added
    for delta in &diff.indexes_added {
        if churned(&delta.table) {
            continue;
        }
        b.push(format!(
            "DROP INDEX IF EXISTS {}.{};",
            delta.table.schema, delta.index.name
        ));
    }

    // 3. Revert altered columns, one ALTER per reverted property
    for delta in &diff.columns_altered {
        if churned(&delta.table) {
            continue;
        }
        let table = &delta.table;
        let name = &delta.before.name;
        if delta.before.data_type != delta.after.data_type {
            b.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                table, name, delta.before.data_type, name, delta.before.data_type
            ));
        }
        if delta.before.default != delta.after.default {
            match &delta.before.default {
                Some(default) => b.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                    table, name, default
                )),
                None => b.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                    table, name
                )),
            }
        }
        if delta.before.nullable != delta.after.nullable {
            if delta.before.nullable {
                b.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                    table, name
                ));
            } else {
                b.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                    table, name
                ));
            }
        }
    }

    // 4. Drop columns the migration added
    for delta in &diff.columns_added {
        if churned(&delta.table) {
            continue;
        }
        b.push(format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
            delta.table, delta.column.name
        ));
        b.warn(format!(
            "dropping {}.{} discards any data written to it since the migration",
            delta.table, delta.column.name
        ));
    }

    // 5. Re-add columns the migration removed; the data is gone
    for delta in &diff.columns_removed {
        if churned(&delta.table) {
            continue;
        }
        let col = &delta.column;
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            delta.table, col.name, col.data_type
        );
        if let Some(default) = &col.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if !col.nullable {
            sql.push_str(" NOT NULL");
            sql.push_str("; -- backfill required before dependent writes resume");
            b.warn(format!(
                "{}.{} was NOT NULL; re-adding it needs a backfill, original values are lost",
                delta.table, col.name
            ));
        } else {
            sql.push(';');
            b.warn(format!(
                "re-adding {}.{} cannot restore the values the migration dropped",
                delta.table, col.name
            ));
        }
        b.push(sql);
    }

    // 6. Restore removed or changed constraints from their prior definition
    for delta in &diff.constraint_changes {
        if delta.kind == ChangeKind::Added || churned(&delta.table) {
            continue;
        }
        if delta.kind == ChangeKind::Changed {
            b.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                delta.table, delta.name
            ));
        }
        match delta.source {
            ConstraintSource::ForeignKey => {
                if let Some(fk) = &delta.before_fk {
                    b.push(foreign_key_sql(&delta.table, fk));
                } else {
                    b.warn(format!(
                        "foreign key {} on {} has no stored prior definition, skipped",
                        delta.name, delta.table
                    ));
                }
            }
            ConstraintSource::Constraint => match delta.before.as_ref() {
                Some(prev) => match constraint_sql(&delta.table, prev) {
                    Some(sql) => b.push(sql),
                    None => b.warn(format!(
                        "constraint {} on {} cannot be reconstructed (no definition text), skipped",
                        delta.name, delta.table
                    )),
                },
                None => b.warn(format!(
                    "constraint {} on {} has no stored prior definition, skipped",
                    delta.name, delta.table
                )),
            },
        }
    }

    // 7. Re-create removed or redefined indexes; primary indexes come back
    // through their constraint, not here
    for delta in &diff.indexes_removed {
        if churned(&delta.table) {
            continue;
        }
        let idx = &delta.index;
        if idx.primary {
            b.warn(format!(
                "primary index {} on {} must be restored via its PRIMARY KEY constraint",
                idx.name, delta.table
            ));
            continue;
        }
        let mut sql = String::from("CREATE ");
        if idx.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str(&format!("INDEX {} ON {}", idx.name, delta.table));
        if let Some(method) = &idx.method {
            sql.push_str(&format!(" USING {}", method));
        }
        sql.push_str(&format!(" ({})", idx.columns.join(", ")));
        if let Some(predicate) = &idx.predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        sql.push(';');
        b.push(sql);
    }

    // 8. Drop tables the migration created
    for table in &diff.tables_added {
        b.push(format!("DROP TABLE IF EXISTS {};", table));
    }

    for table in &diff.tables_removed {
        b.warn(format!(
            "table {} was dropped; rollback cannot restore its structure or data",
            table
        ));
    }

    RollbackPlan {
        statements: b.statements,
        warnings: b.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::build_diff;
    use crate::snapshot::model::{Column, Index, SchemaDef, SchemaSnapshot, Table};

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
                            name: "status".to_string(),
                            data_type: "text".to_string(),
                            nullable: false,
                            default: Some("'open'".to_string()),
                        },
                    ],
                    indexes: vec![Index {
                        name: "orders_status_idx".to_string(),
                        columns: vec!["status".to_string()],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn rollback_for(script: &str) -> RollbackPlan {
        let snap = snapshot();
        let result = build_diff(&snap, script, "public").unwrap();
        generate_rollback(&result.diff)
    }

    #[test]
    fn test_added_nullable_column_rolls_back_to_drop() {
        let plan = rollback_for("ALTER TABLE orders ADD COLUMN note text;");
        assert_eq!(plan.statements.len(), 1);
        assert!(plan.statements[0].contains("DROP COLUMN IF EXISTS note"));
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("discards any data")));
    }

    #[test]
    fn test_type_change_reverts_with_cast() {
        let plan = rollback_for("ALTER TABLE orders ALTER COLUMN id TYPE bigint;");
        assert!(plan.statements[0].contains("TYPE integer USING id::integer"));
    }

    #[test]
    fn test_removed_not_null_column_warns_about_backfill() {
        let plan = rollback_for("ALTER TABLE orders DROP COLUMN status;");
        let sql = plan.statements.join("\n");
        assert!(sql.contains("ADD COLUMN status text DEFAULT 'open' NOT NULL"));
        assert!(plan.warnings.iter().any(|w| w.contains("backfill")));
        // The covering index comes back too
        assert!(sql.contains("CREATE INDEX orders_status_idx"));
    }

    #[test]
    fn test_new_table_is_dropped_and_its_members_skipped() {
        let plan =
            rollback_for("CREATE TABLE shipments (id int PRIMARY KEY, order_id int REFERENCES orders (id));");
        assert_eq!(plan.statements.len(), 1);
        assert_eq!(plan.statements[0], "DROP TABLE IF EXISTS public.shipments;");
    }

    #[test]
    fn test_dropped_table_only_warns() {
        let plan = rollback_for("DROP TABLE orders CASCADE;");
        assert!(plan.statements.is_empty());
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("cannot restore")));
    }

    #[test]
    fn test_removed_fk_is_reconstructed() {
        let snap = snapshot();
        let snap = crate::simulation::apply_statement(
            &snap,
            &crate::parser::Statement::parse(
                "CREATE TABLE shipments (id int, order_id int REFERENCES orders (id) ON DELETE CASCADE)",
            ),
            "public",
        )
        .unwrap();
        let result = build_diff(
            &snap,
            "ALTER TABLE shipments DROP CONSTRAINT shipments_order_id_fkey;",
            "public",
        )
        .unwrap();
        let plan = generate_rollback(&result.diff);
        assert_eq!(plan.statements.len(), 1);
        assert!(plan.statements[0].contains("FOREIGN KEY (order_id) REFERENCES public.orders"));
        assert!(plan.statements[0].contains("ON DELETE CASCADE"));
    }
}
