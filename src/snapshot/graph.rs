//! Foreign key dependency graph
//!
//! Directed graph over the tables of a snapshot where an edge `A -> B` means
//! table A declares a foreign key referencing table B. Node and edge ordering
//! is deterministic so graph output is stable across runs on the same
//! snapshot.

use crate::snapshot::model::{SchemaSnapshot, TableRef};
use std::collections::{BTreeMap, BTreeSet};

/// One table node with its one-hop neighborhood
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNode {
    pub table: TableRef,
    /// Tables this table references through its foreign keys
    pub dependencies: Vec<TableRef>,
    /// Tables whose foreign keys reference this table
    pub dependents: Vec<TableRef>,
}

/// A single foreign key edge, source declares the key
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyEdge {
    pub id: String,
    pub source: TableRef,
    pub target: TableRef,
    pub constraint: String,
    pub columns: Vec<String>,
}

/// FK dependency graph over a snapshot
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGraph {
    pub nodes: BTreeMap<String, TableNode>,
    pub edges: Vec<ForeignKeyEdge>,
}

impl SchemaGraph {
    /// Build the graph from a snapshot. Edges whose target table does not
    /// exist in the snapshot are still recorded; the dangling target simply
    /// has no node.
    pub fn build(snapshot: &SchemaSnapshot) -> Self {
        let mut edges = Vec::new();
        let mut edge_counts: BTreeMap<String, usize> = BTreeMap::new();

        for (schema, table) in snapshot.all_tables() {
            let source = TableRef::new(schema, &table.name);
            for fk in &table.foreign_keys {
                let target = TableRef::new(&fk.referenced_schema, &fk.referenced_table);
                let base = format!("fk:{}->{}:{}", source, target, fk.name);
                // Duplicate constraint names between the same pair get a
                // numeric suffix so edge ids stay unique
                let count = edge_counts.entry(base.clone()).or_insert(0);
                let id = if *count == 0 {
                    base.clone()
                } else {
                    format!("{}#{}", base, *count + 1)
                };
                *count += 1;
                edges.push(ForeignKeyEdge {
                    id,
                    source: source.clone(),
                    target,
                    constraint: fk.name.clone(),
                    columns: fk.columns.clone(),
                });
            }
        }

        edges.sort_by(|a, b| a.id.cmp(&b.id));

        let mut nodes: BTreeMap<String, TableNode> = snapshot
            .all_tables()
            .map(|(schema, table)| {
                let table_ref = TableRef::new(schema, &table.name);
                (
                    table_ref.to_string(),
                    TableNode {
                        table: table_ref,
                        dependencies: Vec::new(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for edge in &edges {
            if let Some(node) = nodes.get_mut(&edge.source.to_string()) {
                node.dependencies.push(edge.target.clone());
            }
            if let Some(node) = nodes.get_mut(&edge.target.to_string()) {
                node.dependents.push(edge.source.clone());
            }
        }
        for node in nodes.values_mut() {
            node.dependencies.sort();
            node.dependencies.dedup();
            node.dependents.sort();
            node.dependents.dedup();
        }

        SchemaGraph { nodes, edges }
    }

    pub fn node(&self, table: &TableRef) -> Option<&TableNode> {
        self.nodes.get(&table.to_string())
    }

    /// One-hop dependencies of a table (tables it references)
    pub fn dependencies(&self, table: &TableRef) -> &[TableRef] {
        self.node(table).map(|n| n.dependencies.as_slice()).unwrap_or(&[])
    }

    /// One-hop dependents of a table (tables referencing it)
    pub fn dependents(&self, table: &TableRef) -> &[TableRef] {
        self.node(table).map(|n| n.dependents.as_slice()).unwrap_or(&[])
    }

    /// Every table reachable from `start` by walking FK edges in either
    /// direction, excluding `start` itself. Output is sorted.
    pub fn reachable(&self, start: &TableRef) -> Vec<TableRef> {
        let mut seen: BTreeSet<TableRef> = BTreeSet::new();
        let mut queue: Vec<TableRef> = vec![start.clone()];
        while let Some(current) = queue.pop() {
            for neighbor in self
                .dependencies(&current)
                .iter()
                .chain(self.dependents(&current))
            {
                if neighbor != start && seen.insert(neighbor.clone()) {
                    queue.push(neighbor.clone());
                }
            }
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::model::{ForeignKey, SchemaDef, Table};

    fn table_with_fk(name: &str, target: &str, fk_name: &str) -> Table {
        Table {
            name: name.to_string(),
            foreign_keys: vec![ForeignKey {
                name: fk_name.to_string(),
                columns: vec![format!("{}_id", target)],
                referenced_schema: "public".to_string(),
                referenced_table: target.to_string(),
                referenced_columns: vec!["id".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables: vec![
                    Table {
                        name: "users".to_string(),
                        ..Default::default()
                    },
                    table_with_fk("orders", "users", "orders_user_fk"),
                    table_with_fk("order_items", "orders", "items_order_fk"),
                ],
                ..Default::default()
            }],
            checksum: String::new(),
        }
    }

    #[test]
    fn test_edges_and_neighborhoods() {
        let graph = SchemaGraph::build(&snapshot());
        assert_eq!(graph.edges.len(), 2);

        let users = TableRef::new("public", "users");
        let orders = TableRef::new("public", "orders");
        assert_eq!(graph.dependents(&users), &[orders.clone()]);
        assert_eq!(graph.dependencies(&orders), &[users.clone()]);
        assert_eq!(
            graph.dependents(&orders),
            &[TableRef::new("public", "order_items")]
        );
    }

    #[test]
    fn test_reachable_walks_both_directions() {
        let graph = SchemaGraph::build(&snapshot());
        let reachable = graph.reachable(&TableRef::new("public", "orders"));
        assert_eq!(
            reachable,
            vec![
                TableRef::new("public", "order_items"),
                TableRef::new("public", "users"),
            ]
        );
    }

    #[test]
    fn test_duplicate_edge_ids_get_suffixed() {
        let mut snap = snapshot();
        let orders = snap.table_mut("public", "orders").unwrap();
        let dup = orders.foreign_keys[0].clone();
        orders.foreign_keys.push(dup);

        let graph = SchemaGraph::build(&snap);
        let ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().any(|id| id.ends_with("#2")));
    }

    #[test]
    fn test_dangling_target_keeps_edge() {
        let snap = SchemaSnapshot {
            schemas: vec![SchemaDef {
                name: "public".to_string(),
                tables: vec![table_with_fk("orders", "missing", "orders_missing_fk")],
                ..Default::default()
            }],
            checksum: String::new(),
        };
        let graph = SchemaGraph::build(&snap);
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.node(&TableRef::new("public", "missing")).is_none());
    }
}
