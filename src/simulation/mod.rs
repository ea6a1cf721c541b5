//! Migration simulation: the DDL interpreter and the snapshot diff engine

pub mod apply;
pub mod diff;

pub use apply::apply_statement;
pub use diff::{
    build_diff, diff_snapshots, normalize_ws, ChangeKind, ColumnAlteredDelta, ColumnDelta,
    ConstraintDelta, ConstraintSource, IndexDelta, MigrationDiff, SimulatedMigration,
};
