//! Snapshot model, payload parsing and the FK dependency graph

pub mod graph;
pub mod model;
pub mod parse;

pub use graph::{ForeignKeyEdge, SchemaGraph, TableNode};
pub use model::{
    Column, Constraint, ConstraintKind, ForeignKey, Index, Routine, RoutineKind, SchemaDef,
    SchemaSnapshot, Table, TableRef, Trigger, View,
};
pub use parse::parse_snapshot;
