//! Snapshot diff engine
//!
//! Compares two snapshots by object identity and produces the structural
//! delta a migration causes. Content comparison normalizes whitespace so
//! formatting-only differences in defaults and definitions do not register
//! as changes. All output lists are sorted for stable JSON.

use crate::error::EngineResult;
use crate::parser::{split_statements, Statement};
use crate::simulation::apply::apply_statement;
use crate::snapshot::model::{
    Column, Constraint, ForeignKey, Index, SchemaSnapshot, Table, TableRef,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// A column that appeared or disappeared
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDelta {
    pub table: TableRef,
    pub column: Column,
}

/// A column whose shape changed in place
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAlteredDelta {
    pub table: TableRef,
    pub before: Column,
    pub after: Column,
}

/// An index that appeared or disappeared
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDelta {
    pub table: TableRef,
    pub index: Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSource {
    Constraint,
    ForeignKey,
}

/// A constraint or foreign key that was added, removed or changed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDelta {
    pub table: TableRef,
    pub name: String,
    pub kind: ChangeKind,
    pub source: ConstraintSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_fk: Option<ForeignKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_fk: Option<ForeignKey>,
}

/// Structural delta between two snapshots
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDiff {
    pub tables_added: Vec<TableRef>,
    pub tables_removed: Vec<TableRef>,
    pub columns_added: Vec<ColumnDelta>,
    pub columns_removed: Vec<ColumnDelta>,
    pub columns_altered: Vec<ColumnAlteredDelta>,
    pub indexes_added: Vec<IndexDelta>,
    pub indexes_removed: Vec<IndexDelta>,
    pub constraint_changes: Vec<ConstraintDelta>,
}

impl MigrationDiff {
    pub fn is_empty(&self) -> bool {
        self.tables_added.is_empty()
            && self.tables_removed.is_empty()
            && self.columns_added.is_empty()
            && self.columns_removed.is_empty()
            && self.columns_altered.is_empty()
            && self.indexes_added.is_empty()
            && self.indexes_removed.is_empty()
            && self.constraint_changes.is_empty()
    }

    /// Every table the diff touches, including both sides of the delta
    pub fn touched_tables(&self) -> Vec<TableRef> {
        let mut touched: BTreeSet<TableRef> = BTreeSet::new();
        touched.extend(self.tables_added.iter().cloned());
        touched.extend(self.tables_removed.iter().cloned());
        touched.extend(self.columns_added.iter().map(|d| d.table.clone()));
        touched.extend(self.columns_removed.iter().map(|d| d.table.clone()));
        touched.extend(self.columns_altered.iter().map(|d| d.table.clone()));
        touched.extend(self.indexes_added.iter().map(|d| d.table.clone()));
        touched.extend(self.indexes_removed.iter().map(|d| d.table.clone()));
        touched.extend(self.constraint_changes.iter().map(|d| d.table.clone()));
        touched.into_iter().collect()
    }
}

/// Collapse runs of whitespace so formatting does not count as change
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn opt_eq_normalized(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => normalize_ws(a) == normalize_ws(b),
        (None, None) => true,
        _ => false,
    }
}

fn columns_equal(a: &Column, b: &Column) -> bool {
    a.name == b.name
        && normalize_ws(&a.data_type) == normalize_ws(&b.data_type)
        && a.nullable == b.nullable
        && opt_eq_normalized(&a.default, &b.default)
}

fn constraints_equal(a: &Constraint, b: &Constraint) -> bool {
    a.kind == b.kind && a.columns == b.columns && opt_eq_normalized(&a.definition, &b.definition)
}

fn foreign_keys_equal(a: &ForeignKey, b: &ForeignKey) -> bool {
    a.columns == b.columns
        && a.referenced_schema == b.referenced_schema
        && a.referenced_table == b.referenced_table
        && a.referenced_columns == b.referenced_columns
        && a.on_update == b.on_update
        && a.on_delete == b.on_delete
}

fn indexes_equal(a: &Index, b: &Index) -> bool {
    a.columns == b.columns
        && a.unique == b.unique
        && a.primary == b.primary
        && a.method == b.method
        && opt_eq_normalized(&a.predicate, &b.predicate)
}

/// Diff two snapshots table by table
pub fn diff_snapshots(before: &SchemaSnapshot, after: &SchemaSnapshot) -> MigrationDiff {
    let mut diff = MigrationDiff::default();

    let before_keys: BTreeSet<TableRef> = before
        .all_tables()
        .map(|(s, t)| TableRef::new(s, &t.name))
        .collect();
    let after_keys: BTreeSet<TableRef> = after
        .all_tables()
        .map(|(s, t)| TableRef::new(s, &t.name))
        .collect();

    diff.tables_added = after_keys.difference(&before_keys).cloned().collect();
    diff.tables_removed = before_keys.difference(&after_keys).cloned().collect();

    for table_ref in before_keys.intersection(&after_keys) {
        let before_table = before.table(&table_ref.schema, &table_ref.name).unwrap();
        let after_table = after.table(&table_ref.schema, &table_ref.name).unwrap();
        diff_table(&mut diff, table_ref, before_table, after_table);
    }

    sort_diff(&mut diff);
    diff
}

fn diff_table(diff: &mut MigrationDiff, table_ref: &TableRef, before: &Table, after: &Table) {
    for col in &after.columns {
        match before.column(&col.name) {
            None => diff.columns_added.push(ColumnDelta {
                table: table_ref.clone(),
                column: col.clone(),
            }),
            Some(prev) if !columns_equal(prev, col) => {
                diff.columns_altered.push(ColumnAlteredDelta {
                    table: table_ref.clone(),
                    before: prev.clone(),
                    after: col.clone(),
                })
            }
            Some(_) => {}
        }
    }
    for col in &before.columns {
        if after.column(&col.name).is_none() {
            diff.columns_removed.push(ColumnDelta {
                table: table_ref.clone(),
                column: col.clone(),
            });
        }
    }

    for idx in &after.indexes {
        match before.indexes.iter().find(|i| i.name == idx.name) {
            None => diff.indexes_added.push(IndexDelta {
                table: table_ref.clone(),
                index: idx.clone(),
            }),
            Some(prev) if !indexes_equal(prev, idx) => {
                // An index redefinition shows up as remove plus add
                diff.indexes_removed.push(IndexDelta {
                    table: table_ref.clone(),
                    index: prev.clone(),
                });
                diff.indexes_added.push(IndexDelta {
                    table: table_ref.clone(),
                    index: idx.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for idx in &before.indexes {
        if !after.indexes.iter().any(|i| i.name == idx.name) {
            diff.indexes_removed.push(IndexDelta {
                table: table_ref.clone(),
                index: idx.clone(),
            });
        }
    }

    diff_constraints(diff, table_ref, before, after);
}

fn diff_constraints(diff: &mut MigrationDiff, table_ref: &TableRef, before: &Table, after: &Table) {
    for c in &after.constraints {
        match before.constraint(&c.name) {
            None => diff.constraint_changes.push(ConstraintDelta {
                table: table_ref.clone(),
                name: c.name.clone(),
                kind: ChangeKind::Added,
                source: ConstraintSource::Constraint,
                before: None,
                after: Some(c.clone()),
                before_fk: None,
                after_fk: None,
            }),
            Some(prev) if !constraints_equal(prev, c) => {
                diff.constraint_changes.push(ConstraintDelta {
                    table: table_ref.clone(),
                    name: c.name.clone(),
                    kind: ChangeKind::Changed,
                    source: ConstraintSource::Constraint,
                    before: Some(prev.clone()),
                    after: Some(c.clone()),
                    before_fk: None,
                    after_fk: None,
                })
            }
            Some(_) => {}
        }
    }
    for c in &before.constraints {
        if after.constraint(&c.name).is_none() {
            diff.constraint_changes.push(ConstraintDelta {
                table: table_ref.clone(),
                name: c.name.clone(),
                kind: ChangeKind::Removed,
                source: ConstraintSource::Constraint,
                before: Some(c.clone()),
                after: None,
                before_fk: None,
                after_fk: None,
            });
        }
    }

    for fk in &after.foreign_keys {
        match before.foreign_keys.iter().find(|f| f.name == fk.name) {
            None => diff.constraint_changes.push(ConstraintDelta {
                table: table_ref.clone(),
                name: fk.name.clone(),
                kind: ChangeKind::Added,
                source: ConstraintSource::ForeignKey,
                before: None,
                after: None,
                before_fk: None,
                after_fk: Some(fk.clone()),
            }),
            Some(prev) if !foreign_keys_equal(prev, fk) => {
                diff.constraint_changes.push(ConstraintDelta {
                    table: table_ref.clone(),
                    name: fk.name.clone(),
                    kind: ChangeKind::Changed,
                    source: ConstraintSource::ForeignKey,
                    before: None,
                    after: None,
                    before_fk: Some(prev.clone()),
                    after_fk: Some(fk.clone()),
                })
            }
            Some(_) => {}
        }
    }
    for fk in &before.foreign_keys {
        if !after.foreign_keys.iter().any(|f| f.name == fk.name) {
            diff.constraint_changes.push(ConstraintDelta {
                table: table_ref.clone(),
                name: fk.name.clone(),
                kind: ChangeKind::Removed,
                source: ConstraintSource::ForeignKey,
                before: None,
                after: None,
                before_fk: Some(fk.clone()),
                after_fk: None,
            });
        }
    }
}

fn sort_diff(diff: &mut MigrationDiff) {
    diff.tables_added.sort();
    diff.tables_removed.sort();
    diff.columns_added
        .sort_by(|a, b| (&a.table, &a.column.name).cmp(&(&b.table, &b.column.name)));
    diff.columns_removed
        .sort_by(|a, b| (&a.table, &a.column.name).cmp(&(&b.table, &b.column.name)));
    diff.columns_altered
        .sort_by(|a, b| (&a.table, &a.before.name).cmp(&(&b.table, &b.before.name)));
    diff.indexes_added
        .sort_by(|a, b| (&a.table, &a.index.name).cmp(&(&b.table, &b.index.name)));
    diff.indexes_removed
        .sort_by(|a, b| (&a.table, &a.index.name).cmp(&(&b.table, &b.index.name)));
    diff.constraint_changes
        .sort_by(|a, b| (&a.table, &a.name).cmp(&(&b.table, &b.name)));
}

/// Outcome of splitting, parsing and best-effort applying a script
#[derive(Debug, Clone)]
pub struct SimulatedMigration {
    pub statements: Vec<String>,
    pub applied_statements: usize,
    pub before: SchemaSnapshot,
    pub after: SchemaSnapshot,
    pub diff: MigrationDiff,
}

/// Split a script, apply what parses and applies cleanly, diff the result.
/// Statements that fail to parse or apply are skipped, never fatal.
pub fn build_diff(
    snapshot: &SchemaSnapshot,
    ddl: &str,
    default_schema: &str,
) -> EngineResult<SimulatedMigration> {
    let statements = split_statements(ddl);
    let mut current = snapshot.clone();
    let mut applied = 0usize;

    for (position, sql) in statements.iter().enumerate() {
        let statement = Statement::parse(sql);
        if !statement.is_recognized() {
            debug!(position, "skipping unrecognized statement");
            continue;
        }
        match apply_statement(&current, &statement, default_schema) {
            Ok(next) => {
                current = next;
                applied += 1;
            }
            Err(err) => {
                debug!(position, error = %err, "statement failed to apply, skipping");
            }
        }
    }

    let diff = diff_snapshots(snapshot, &current);
    Ok(SimulatedMigration {
        statements,
        applied_statements: applied,
        before: snapshot.clone(),
        after: current,
        diff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::model::SchemaDef;

    fn snapshot_with(tables: Vec<Table>) -> SchemaSnapshot {
        SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables,
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn users_table() -> Table {
        Table {
            name: "users".to_string(),
            columns: vec![
                Column {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    default: None,
                },
                Column {
                    name: "email".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    default: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_diff_for_identical_snapshots() {
        let a = snapshot_with(vec![users_table()]);
        let diff = diff_snapshots(&a, &a.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_detects_column_changes() {
        let before = snapshot_with(vec![users_table()]);
        let mut after = snapshot_with(vec![users_table()]);
        {
            let t = after.table_mut("public", "users").unwrap();
            t.columns.retain(|c| c.name != "email");
            t.columns.push(Column {
                name: "status".to_string(),
                data_type: "text".to_string(),
                nullable: true,
                default: None,
            });
            t.column_mut("id").unwrap().data_type = "bigint".to_string();
        }

        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.columns_added.len(), 1);
        assert_eq!(diff.columns_added[0].column.name, "status");
        assert_eq!(diff.columns_removed.len(), 1);
        assert_eq!(diff.columns_removed[0].column.name, "email");
        assert_eq!(diff.columns_altered.len(), 1);
        assert_eq!(diff.columns_altered[0].after.data_type, "bigint");
    }

    #[test]
    fn test_whitespace_only_change_is_not_a_diff() {
        let mut before = snapshot_with(vec![users_table()]);
        before.table_mut("public", "users").unwrap().column_mut("email").unwrap().default =
            Some("lower( email )".to_string());
        let mut after = before.clone();
        after.table_mut("public", "users").unwrap().column_mut("email").unwrap().default =
            Some("lower(  email  )".to_string());

        assert!(diff_snapshots(&before, &after).is_empty());
    }

    #[test]
    fn test_constraint_change_kinds() {
        let mut before = snapshot_with(vec![users_table()]);
        before.table_mut("public", "users").unwrap().constraints.push(Constraint {
            name: "users_id_check".to_string(),
            kind: crate::snapshot::model::ConstraintKind::Check,
            columns: vec!["id".to_string()],
            definition: Some("id > 0".to_string()),
        });

        let mut after = before.clone();
        after.table_mut("public", "users").unwrap().constraints[0].definition =
            Some("id >= 1".to_string());

        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.constraint_changes.len(), 1);
        assert_eq!(diff.constraint_changes[0].kind, ChangeKind::Changed);
        assert_eq!(diff.constraint_changes[0].source, ConstraintSource::Constraint);
    }

    #[test]
    fn test_diff_is_antisymmetric() {
        let before = snapshot_with(vec![users_table()]);
        let result = build_diff(
            &before,
            "CREATE TABLE orders (id int PRIMARY KEY); ALTER TABLE users DROP COLUMN email;",
            "public",
        )
        .unwrap();

        let orders = TableRef::new("public", "orders");
        let forward = diff_snapshots(&before, &result.after);
        assert!(forward.tables_added.contains(&orders));
        assert_eq!(forward.columns_removed.len(), 1);

        let reverse = diff_snapshots(&result.after, &before);
        assert!(reverse.tables_removed.contains(&orders));
        assert!(reverse.tables_added.is_empty());
        assert_eq!(reverse.columns_added.len(), 1);
        assert_eq!(reverse.columns_added[0].column.name, "email");
    }

    #[test]
    fn test_build_diff_skips_broken_statements() {
        let snapshot = snapshot_with(vec![users_table()]);
        let script = "\
            ALTER TABLE users ADD COLUMN status text;\n\
            ALTER TABLE ghosts ADD COLUMN x int;\n\
            COMPLETELY NOT SQL;\n\
            CREATE INDEX ON users (email);";

        let result = build_diff(&snapshot, script, "public").unwrap();
        assert_eq!(result.statements.len(), 4);
        assert_eq!(result.applied_statements, 2);
        assert_eq!(result.diff.columns_added.len(), 1);
        assert_eq!(result.diff.indexes_added.len(), 1);
    }

    #[test]
    fn test_touched_tables() {
        let before = snapshot_with(vec![users_table()]);
        let result = build_diff(
            &before,
            "CREATE TABLE orders (id int); ALTER TABLE users DROP COLUMN email;",
            "public",
        )
        .unwrap();
        assert_eq!(
            result.diff.touched_tables(),
            vec![TableRef::new("public", "orders"), TableRef::new("public", "users")]
        );
    }
}
