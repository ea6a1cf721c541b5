//! Blast radius analysis
//!
//! Walks the diff against the pre-migration snapshot and the FK graph to
//! find what a migration touches directly, what it breaks outright, and what
//! sits one or more FK hops away. Views, routines and triggers have no typed
//! dependency metadata in the snapshot, so references into them are found by
//! textual matching over their definitions.

use crate::simulation::{ChangeKind, ConstraintDelta, ConstraintSource, MigrationDiff};
use crate::snapshot::model::{SchemaSnapshot, TableRef};
use crate::snapshot::SchemaGraph;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

/// What the migration touches, sorted and deduplicated
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    /// Objects the migration touches or that depend on touched objects
    pub direct_impact: Vec<String>,
    /// Tables reachable over FK edges from touched tables
    pub indirect_impact: Vec<String>,
    /// Objects the migration leaves broken or removed
    pub broken_objects: Vec<String>,
}

impl ImpactReport {
    /// Total number of distinct impacted objects across all three sets
    pub fn fan_out(&self) -> usize {
        let mut all: BTreeSet<&str> = self.direct_impact.iter().map(String::as_str).collect();
        all.extend(self.indirect_impact.iter().map(String::as_str));
        all.extend(self.broken_objects.iter().map(String::as_str));
        all.len()
    }
}

/// Decides whether a free-text definition references a table or column
pub trait ReferenceMatcher {
    fn references_table(&self, definition: &str, table: &TableRef) -> bool;
    fn references_column(&self, definition: &str, table: &TableRef, column: &str) -> bool;
}

/// Word-bounded textual matcher over definition bodies. Quoted and
/// schema-qualified occurrences both count; matching is case-insensitive
/// because unquoted SQL identifiers fold.
#[derive(Debug, Default)]
pub struct TextualReferenceMatcher;

fn mentions_word(definition: &str, word: &str) -> bool {
    let pattern = format!(
        r#"(?i)(?:^|[^a-zA-Z0-9_]){}(?:$|[^a-zA-Z0-9_])"#,
        regex::escape(word)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(definition),
        Err(_) => false,
    }
}

impl ReferenceMatcher for TextualReferenceMatcher {
    fn references_table(&self, definition: &str, table: &TableRef) -> bool {
        mentions_word(definition, &table.name)
    }

    fn references_column(&self, definition: &str, table: &TableRef, column: &str) -> bool {
        mentions_word(definition, &table.name) && mentions_word(definition, column)
    }
}

struct Collector<'a> {
    before: &'a SchemaSnapshot,
    graph: &'a SchemaGraph,
    matcher: &'a dyn ReferenceMatcher,
    direct: BTreeSet<String>,
    broken: BTreeSet<String>,
    seeds: BTreeSet<TableRef>,
}

/// Analyze the blast radius of a diff against the pre-migration snapshot
pub fn analyze_impact(
    diff: &MigrationDiff,
    before: &SchemaSnapshot,
    graph: &SchemaGraph,
    matcher: &dyn ReferenceMatcher,
) -> ImpactReport {
    let mut c = Collector {
        before,
        graph,
        matcher,
        direct: BTreeSet::new(),
        broken: BTreeSet::new(),
        seeds: BTreeSet::new(),
    };

    for table in &diff.tables_removed {
        c.table_removed(table);
    }
    for delta in &diff.columns_removed {
        c.column_touched(&delta.table, &delta.column.name, true);
    }
    for delta in &diff.columns_altered {
        let type_changed = delta.before.data_type != delta.after.data_type;
        c.column_touched(&delta.table, &delta.before.name, type_changed);
    }
    for delta in &diff.constraint_changes {
        if delta.kind == ChangeKind::Added {
            continue;
        }
        c.constraint_changed(delta);
    }

    let direct_tables: BTreeSet<TableRef> = c.seeds.clone();
    let mut indirect: BTreeSet<String> = BTreeSet::new();
    for seed in &c.seeds {
        for reached in c.graph.reachable(seed) {
            if !direct_tables.contains(&reached) {
                indirect.insert(format!("table {}", reached));
            }
        }
    }
    for label in &c.direct {
        indirect.remove(label);
    }

    ImpactReport {
        direct_impact: c.direct.into_iter().collect(),
        indirect_impact: indirect.into_iter().collect(),
        broken_objects: c.broken.into_iter().collect(),
    }
}

impl<'a> Collector<'a> {
    fn table_removed(&mut self, table: &TableRef) {
        let label = format!("table {}", table);
        self.direct.insert(label.clone());
        self.broken.insert(label);
        self.seeds.insert(table.clone());

        // Inbound foreign keys lose their target
        for dependent in self.graph.dependents(table) {
            if let Some(t) = self.before.table(&dependent.schema, &dependent.name) {
                for fk in &t.foreign_keys {
                    if fk.referenced_schema == table.schema && fk.referenced_table == table.name {
                        let fk_label = format!(
                            "foreign_key {}.{} -> {}",
                            dependent,
                            fk.columns.join(","),
                            table
                        );
                        self.direct.insert(fk_label.clone());
                        self.broken.insert(fk_label);
                    }
                }
            }
        }

        self.scan_definitions(table, None);
    }

    /// A column was removed or altered; destructive changes break dependents
    fn column_touched(&mut self, table: &TableRef, column: &str, destructive: bool) {
        self.direct.insert(format!("table {}", table));
        self.seeds.insert(table.clone());

        let Some(t) = self.before.table(&table.schema, &table.name) else {
            return;
        };

        for idx in &t.indexes {
            if idx.columns.iter().any(|c| c == column) {
                let label = format!("index {}.{}", table, idx.name);
                self.direct.insert(label.clone());
                if destructive {
                    self.broken.insert(label);
                }
            }
        }
        for fk in &t.foreign_keys {
            if fk.columns.iter().any(|c| c == column) {
                let label = format!(
                    "foreign_key {}.{} -> {}.{}",
                    table,
                    fk.columns.join(","),
                    fk.referenced_schema,
                    fk.referenced_table
                );
                self.direct.insert(label.clone());
                if destructive {
                    self.broken.insert(label);
                }
            }
        }
        // Inbound keys whose referenced columns include this column
        for dependent in self.graph.dependents(table) {
            if let Some(dt) = self.before.table(&dependent.schema, &dependent.name) {
                for fk in &dt.foreign_keys {
                    if fk.referenced_schema == table.schema
                        && fk.referenced_table == table.name
                        && fk.referenced_columns.iter().any(|c| c == column)
                    {
                        let label = format!(
                            "foreign_key {}.{} -> {}",
                            dependent,
                            fk.columns.join(","),
                            table
                        );
                        self.direct.insert(label.clone());
                        if destructive {
                            self.broken.insert(label);
                        }
                    }
                }
            }
        }

        self.scan_definitions(table, Some((column, destructive)));
    }

    /// A constraint or foreign key was removed or redefined. Anything
    /// depending on the old guarantee counts as touched: indexes over the
    /// constrained columns, and every view/routine/trigger that references
    /// the table.
    fn constraint_changed(&mut self, delta: &ConstraintDelta) {
        self.direct.insert(format!("table {}", delta.table));
        self.seeds.insert(delta.table.clone());

        let columns: Vec<String> = match delta.source {
            ConstraintSource::ForeignKey => {
                if let Some(fk) = delta.before_fk.as_ref() {
                    let label = format!(
                        "foreign_key {}.{} -> {}.{}",
                        delta.table,
                        fk.columns.join(","),
                        fk.referenced_schema,
                        fk.referenced_table
                    );
                    self.direct.insert(label.clone());
                    self.broken.insert(label);
                    fk.columns.clone()
                } else {
                    Vec::new()
                }
            }
            ConstraintSource::Constraint => delta
                .before
                .as_ref()
                .map(|c| c.columns.clone())
                .unwrap_or_default(),
        };

        if let Some(t) = self.before.table(&delta.table.schema, &delta.table.name) {
            for idx in &t.indexes {
                if idx.columns.iter().any(|c| columns.contains(c)) {
                    self.direct.insert(format!("index {}.{}", delta.table, idx.name));
                }
            }
        }

        self.scan_definitions(&delta.table, None);
    }

    /// Find views, routines and triggers whose definitions reference the
    /// table (or the specific column, when given).
    fn scan_definitions(&mut self, table: &TableRef, column: Option<(&str, bool)>) {
        for schema in &self.before.schemas {
            for view in &schema.views {
                let hit = match column {
                    Some((col, _)) => {
                        self.matcher.references_column(&view.definition, table, col)
                    }
                    None => self.matcher.references_table(&view.definition, table),
                };
                if hit {
                    let label = format!("view {}.{}", schema.name, view.name);
                    self.direct.insert(label.clone());
                    if column.map(|(_, d)| d).unwrap_or(true) {
                        self.broken.insert(label);
                    }
                }
            }
            for routine in &schema.routines {
                let hit = match column {
                    Some((col, _)) => {
                        self.matcher.references_column(&routine.definition, table, col)
                    }
                    None => self.matcher.references_table(&routine.definition, table),
                };
                if hit {
                    let kind = match routine.kind {
                        crate::snapshot::RoutineKind::Function => "function",
                        crate::snapshot::RoutineKind::Procedure => "procedure",
                    };
                    let label = format!("{} {}.{}", kind, schema.name, routine.name);
                    self.direct.insert(label.clone());
                    if column.map(|(_, d)| d).unwrap_or(true) {
                        self.broken.insert(label);
                    }
                }
            }
            for trigger in &schema.triggers {
                let on_table = schema.name == table.schema && trigger.table == table.name;
                let hit = match column {
                    Some((col, _)) => {
                        on_table
                            && (trigger.columns.iter().any(|c| c == col)
                                || mentions_word(&trigger.definition, col))
                    }
                    None => on_table,
                };
                if hit {
                    let label = format!("trigger {}.{}.{}", schema.name, trigger.table, trigger.name);
                    self.direct.insert(label.clone());
                    if column.map(|(_, d)| d).unwrap_or(true) {
                        self.broken.insert(label);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::build_diff;
    use crate::snapshot::model::{
        Column, Constraint, ConstraintKind, ForeignKey, Index, SchemaDef, Table, View,
    };

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables: vec![
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
                        constraints: vec![Constraint {
                            name: "users_email_key".to_string(),
                            kind: ConstraintKind::Unique,
                            columns: vec!["email".to_string()],
                            definition: None,
                        }],
                        indexes: vec![Index {
                            name: "users_email_idx".to_string(),
                            columns: vec!["email".to_string()],
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                    Table {
                        name: "orders".to_string(),
                        columns: vec![Column {
                            name: "user_id".to_string(),
                            data_type: "integer".to_string(),
                            nullable: true,
                            default: None,
                        }],
                        foreign_keys: vec![ForeignKey {
                            name: "orders_user_fk".to_string(),
                            columns: vec!["user_id".to_string()],
                            referenced_schema: "public".to_string(),
                            referenced_table: "users".to_string(),
                            referenced_columns: vec!["id".to_string()],
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                ],
                views: vec![View {
                    name: "active_users".to_string(),
                    definition: "SELECT id, email FROM users WHERE email IS NOT NULL".to_string(),
                }],
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    fn impact_for(script: &str) -> ImpactReport {
        let snap = snapshot();
        let result = build_diff(&snap, script, "public").unwrap();
        let graph = SchemaGraph::build(&snap);
        analyze_impact(&result.diff, &snap, &graph, &TextualReferenceMatcher)
    }

    #[test]
    fn test_drop_table_breaks_inbound_fk_and_view() {
        let report = impact_for("DROP TABLE users CASCADE;");
        assert!(report.broken_objects.contains(&"table public.users".to_string()));
        assert!(report
            .broken_objects
            .contains(&"foreign_key public.orders.user_id -> public.users".to_string()));
        assert!(report
            .broken_objects
            .contains(&"view public.active_users".to_string()));
    }

    #[test]
    fn test_drop_column_breaks_index_and_view() {
        let report = impact_for("ALTER TABLE users DROP COLUMN email;");
        assert!(report
            .broken_objects
            .contains(&"index public.users.users_email_idx".to_string()));
        assert!(report
            .broken_objects
            .contains(&"view public.active_users".to_string()));
        assert!(report.direct_impact.contains(&"table public.users".to_string()));
    }

    #[test]
    fn test_indirect_impact_walks_fk_graph() {
        let report = impact_for("ALTER TABLE users DROP COLUMN email;");
        assert!(report
            .indirect_impact
            .contains(&"table public.orders".to_string()));
    }

    #[test]
    fn test_additive_change_breaks_nothing() {
        let report = impact_for("ALTER TABLE users ADD COLUMN status text;");
        assert!(report.broken_objects.is_empty());
    }

    #[test]
    fn test_type_change_is_destructive_for_dependents() {
        let report = impact_for("ALTER TABLE users ALTER COLUMN email TYPE varchar(64);");
        assert!(report
            .broken_objects
            .contains(&"index public.users.users_email_idx".to_string()));
    }

    #[test]
    fn test_constraint_removal_scans_definitions_and_indexes() {
        let report = impact_for("ALTER TABLE users DROP CONSTRAINT users_email_key;");
        assert!(report.direct_impact.contains(&"table public.users".to_string()));
        assert!(report
            .direct_impact
            .contains(&"index public.users.users_email_idx".to_string()));
        assert!(report
            .broken_objects
            .contains(&"view public.active_users".to_string()));
        assert!(report
            .indirect_impact
            .contains(&"table public.orders".to_string()));
    }

    #[test]
    fn test_fan_out_counts_distinct_objects_across_sets() {
        let report = impact_for("ALTER TABLE users DROP COLUMN email;");
        let union: std::collections::BTreeSet<&String> = report
            .direct_impact
            .iter()
            .chain(report.indirect_impact.iter())
            .chain(report.broken_objects.iter())
            .collect();
        assert_eq!(report.fan_out(), union.len());
        assert!(report.fan_out() >= report.indirect_impact.len());
    }

    #[test]
    fn test_textual_matcher_is_word_bounded() {
        let matcher = TextualReferenceMatcher;
        let users = TableRef::new("public", "users");
        assert!(matcher.references_table("SELECT * FROM users", &users));
        assert!(matcher.references_table("SELECT * FROM public.users;", &users));
        assert!(!matcher.references_table("SELECT * FROM users_archive", &users));
    }
}
